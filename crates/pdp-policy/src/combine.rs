//! The combining-algorithm engine (C7, spec §4.7): fold a set's per-member
//! votes into the set's own vote.

use crate::document::{CombiningAlgorithm, DefaultVote, ErrorsMode};
use crate::vote::{IndeterminateTag, Vote};
use pdp_core::{Decision, Value};

/// Fold `votes` (one per member, in declared order) under `algorithm`,
/// then apply the set's default-vote and error-handling-mode overlays
/// (spec §4.7: these two apply uniformly across every algorithm, after
/// the algorithm's own fold).
pub fn fold(algorithm: CombiningAlgorithm, default_vote: DefaultVote, errors_mode: ErrorsMode, votes: Vec<Vote>) -> Vote {
    let mut result = match algorithm {
        CombiningAlgorithm::DenyOverrides => deny_overrides(&votes),
        CombiningAlgorithm::PermitOverrides => permit_overrides(&votes),
        CombiningAlgorithm::DenyUnlessPermit => deny_unless_permit(&votes),
        CombiningAlgorithm::PermitUnlessDeny => permit_unless_deny(&votes),
        CombiningAlgorithm::FirstApplicable => first_applicable(&votes, errors_mode),
        CombiningAlgorithm::OnlyOneApplicable => only_one_applicable(&votes),
        CombiningAlgorithm::Unanimous { strict } => unanimous(&votes, strict),
        CombiningAlgorithm::Unique => unique(&votes),
    };

    if result.decision == Decision::NotApplicable {
        result = match default_vote {
            DefaultVote::Permit => Vote::permit(vec![], vec![], None, result.attributes),
            DefaultVote::Deny => Vote::deny(vec![], vec![], None, result.attributes),
            DefaultVote::Abstain => result,
        };
    }

    if result.decision == Decision::Indeterminate && errors_mode == ErrorsMode::Abstain {
        result = Vote::not_applicable(result.attributes);
    }

    result
}

enum AggregatedResource {
    None,
    One(Value),
    Conflict,
}

struct Aggregated {
    obligations: Vec<Value>,
    advice: Vec<Value>,
    resource: AggregatedResource,
    attributes: Vec<String>,
}

/// Obligations/advice/resource from every *contributing* vote (decision
/// equal to `final_decision`); attribute names are unioned across every
/// vote examined, contributing or not (spec §4.7 "aggregation of
/// contributing attributes" — see DESIGN.md for why this implementation
/// unions unconditionally rather than only over contributing votes).
fn aggregate(votes: &[Vote], final_decision: Decision) -> Aggregated {
    let mut obligations = Vec::new();
    let mut advice = Vec::new();
    let mut resources = Vec::new();
    let mut attributes: Vec<String> = Vec::new();
    for v in votes {
        if v.decision == final_decision {
            obligations.extend(v.obligations.iter().cloned());
            advice.extend(v.advice.iter().cloned());
            if let Some(r) = &v.resource {
                resources.push(r.clone());
            }
        }
        for a in &v.attributes {
            if !attributes.contains(a) {
                attributes.push(a.clone());
            }
        }
    }
    let resource = match resources.len() {
        0 => AggregatedResource::None,
        1 => AggregatedResource::One(resources.into_iter().next().unwrap()),
        _ => AggregatedResource::Conflict,
    };
    Aggregated { obligations, advice, resource, attributes }
}

/// Union every vote's attribute list, in first-occurrence order, with no
/// regard to which votes were contributing (used for `NOT_APPLICABLE` and
/// plain `INDETERMINATE` finals, which have no single contributing set).
fn union_all_attributes(votes: &[Vote]) -> Vec<String> {
    let mut out = Vec::new();
    for v in votes {
        for a in &v.attributes {
            if !out.contains(a) {
                out.push(a.clone());
            }
        }
    }
    out
}

/// Build the final vote for a decisive `Permit`/`Deny` outcome, demoting
/// to `INDETERMINATE` if two contributing votes disagree on the resource
/// transform (spec §4.7 "transformation uncertainty").
fn finalize_decisive(decision: Decision, votes: &[Vote]) -> Vote {
    let agg = aggregate(votes, decision);
    let tag = match decision {
        Decision::Permit => IndeterminateTag::Permit,
        Decision::Deny => IndeterminateTag::Deny,
        _ => unreachable!("finalize_decisive only ever called with Permit or Deny"),
    };
    match agg.resource {
        AggregatedResource::Conflict => Vote::indeterminate(tag, agg.attributes),
        AggregatedResource::None => match decision {
            Decision::Permit => Vote::permit(agg.obligations, agg.advice, None, agg.attributes),
            Decision::Deny => Vote::deny(agg.obligations, agg.advice, None, agg.attributes),
            _ => unreachable!(),
        },
        AggregatedResource::One(r) => match decision {
            Decision::Permit => Vote::permit(agg.obligations, agg.advice, Some(r), agg.attributes),
            Decision::Deny => Vote::deny(agg.obligations, agg.advice, Some(r), agg.attributes),
            _ => unreachable!(),
        },
    }
}

/// The widened tag of every member of `subset`, used when several
/// indeterminate votes jointly block a decisive outcome.
fn indeterminate_from(subset: &[&Vote], all: &[Vote]) -> Vote {
    let mut tag = subset[0].tag.expect("indeterminate vote always carries a tag");
    for v in &subset[1..] {
        tag = tag.widen(v.tag.expect("indeterminate vote always carries a tag"));
    }
    Vote::indeterminate(tag, union_all_attributes(all))
}

fn deny_overrides(votes: &[Vote]) -> Vote {
    if votes.iter().any(|v| v.decision == Decision::Deny) {
        return finalize_decisive(Decision::Deny, votes);
    }
    let blocking: Vec<&Vote> =
        votes.iter().filter(|v| v.decision == Decision::Indeterminate && v.could_have_been_deny()).collect();
    if !blocking.is_empty() {
        return indeterminate_from(&blocking, votes);
    }
    if votes.iter().any(|v| v.decision == Decision::Permit) {
        return finalize_decisive(Decision::Permit, votes);
    }
    let remaining: Vec<&Vote> = votes.iter().filter(|v| v.decision == Decision::Indeterminate).collect();
    if !remaining.is_empty() {
        return indeterminate_from(&remaining, votes);
    }
    Vote::not_applicable(union_all_attributes(votes))
}

fn permit_overrides(votes: &[Vote]) -> Vote {
    if votes.iter().any(|v| v.decision == Decision::Permit) {
        return finalize_decisive(Decision::Permit, votes);
    }
    let blocking: Vec<&Vote> =
        votes.iter().filter(|v| v.decision == Decision::Indeterminate && v.could_have_been_permit()).collect();
    if !blocking.is_empty() {
        return indeterminate_from(&blocking, votes);
    }
    if votes.iter().any(|v| v.decision == Decision::Deny) {
        return finalize_decisive(Decision::Deny, votes);
    }
    let remaining: Vec<&Vote> = votes.iter().filter(|v| v.decision == Decision::Indeterminate).collect();
    if !remaining.is_empty() {
        return indeterminate_from(&remaining, votes);
    }
    Vote::not_applicable(union_all_attributes(votes))
}

fn deny_unless_permit(votes: &[Vote]) -> Vote {
    if votes.iter().any(|v| v.decision == Decision::Permit) {
        finalize_decisive(Decision::Permit, votes)
    } else {
        finalize_decisive(Decision::Deny, votes)
    }
}

fn permit_unless_deny(votes: &[Vote]) -> Vote {
    if votes.iter().any(|v| v.decision == Decision::Deny) {
        finalize_decisive(Decision::Deny, votes)
    } else {
        finalize_decisive(Decision::Permit, votes)
    }
}

/// Stops scanning at the first decisive or (propagate-mode) indeterminate
/// vote; in abstain mode an indeterminate member is skipped rather than
/// stopping the search, since its error is going to be swallowed anyway.
fn first_applicable(votes: &[Vote], errors_mode: ErrorsMode) -> Vote {
    for (i, v) in votes.iter().enumerate() {
        match v.decision {
            Decision::NotApplicable => continue,
            Decision::Permit | Decision::Deny => return finalize_decisive(v.decision, &votes[..=i]),
            Decision::Indeterminate => {
                if errors_mode == ErrorsMode::Abstain {
                    continue;
                }
                return Vote::indeterminate(
                    v.tag.expect("indeterminate vote always carries a tag"),
                    union_all_attributes(&votes[..=i]),
                );
            }
        }
    }
    Vote::not_applicable(union_all_attributes(votes))
}

fn only_one_applicable(votes: &[Vote]) -> Vote {
    let applicable: Vec<&Vote> = votes.iter().filter(|v| v.decision != Decision::NotApplicable).collect();
    match applicable.len() {
        0 => Vote::not_applicable(union_all_attributes(votes)),
        1 => match applicable[0].decision {
            Decision::Permit | Decision::Deny => finalize_decisive(applicable[0].decision, votes),
            Decision::Indeterminate => Vote::indeterminate(
                applicable[0].tag.expect("indeterminate vote always carries a tag"),
                union_all_attributes(votes),
            ),
            Decision::NotApplicable => unreachable!("filtered out above"),
        },
        _ => Vote::indeterminate(IndeterminateTag::PermitOrDeny, union_all_attributes(votes)),
    }
}

/// Like `only_one_applicable`, but zero applicable members is a collision
/// too (spec §4.7: "if exactly one applicable policy, its decision; else
/// INDETERMINATE (collision)" — unlike only-one-applicable's own row, which
/// treats zero as NOT_APPLICABLE).
fn unique(votes: &[Vote]) -> Vote {
    let applicable: Vec<&Vote> = votes.iter().filter(|v| v.decision != Decision::NotApplicable).collect();
    match applicable.len() {
        1 => match applicable[0].decision {
            Decision::Permit | Decision::Deny => finalize_decisive(applicable[0].decision, votes),
            Decision::Indeterminate => Vote::indeterminate(
                applicable[0].tag.expect("indeterminate vote always carries a tag"),
                union_all_attributes(votes),
            ),
            Decision::NotApplicable => unreachable!("filtered out above"),
        },
        _ => Vote::indeterminate(IndeterminateTag::PermitOrDeny, union_all_attributes(votes)),
    }
}

fn unanimous(votes: &[Vote], strict: bool) -> Vote {
    let applicable: Vec<&Vote> = votes.iter().filter(|v| v.decision != Decision::NotApplicable).collect();
    if applicable.is_empty() {
        return Vote::not_applicable(union_all_attributes(votes));
    }
    if applicable.iter().any(|v| v.decision == Decision::Indeterminate) {
        return Vote::indeterminate(IndeterminateTag::PermitOrDeny, union_all_attributes(votes));
    }
    let first_decision = applicable[0].decision;
    if !applicable.iter().all(|v| v.decision == first_decision) {
        return Vote::indeterminate(IndeterminateTag::PermitOrDeny, union_all_attributes(votes));
    }
    if strict {
        let first = applicable[0];
        let agree = applicable.iter().all(|v| v.obligations == first.obligations && v.advice == first.advice);
        if !agree {
            return Vote::indeterminate(IndeterminateTag::PermitOrDeny, union_all_attributes(votes));
        }
    }
    finalize_decisive(first_decision, votes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permit() -> Vote {
        Vote::permit(vec![], vec![], None, vec![])
    }
    fn deny() -> Vote {
        Vote::deny(vec![], vec![], None, vec![])
    }
    fn na() -> Vote {
        Vote::not_applicable(vec![])
    }
    fn indet(tag: IndeterminateTag) -> Vote {
        Vote::indeterminate(tag, vec![])
    }

    #[test]
    fn deny_overrides_picks_deny_over_permit() {
        let v = fold(
            CombiningAlgorithm::DenyOverrides,
            DefaultVote::Abstain,
            ErrorsMode::Propagate,
            vec![permit(), deny()],
        );
        assert_eq!(v.decision, Decision::Deny);
    }

    #[test]
    fn permit_overrides_skips_not_applicable() {
        let v = fold(
            CombiningAlgorithm::PermitOverrides,
            DefaultVote::Abstain,
            ErrorsMode::Propagate,
            vec![permit(), na()],
        );
        assert_eq!(v.decision, Decision::Permit);
    }

    #[test]
    fn deny_overrides_blocked_by_deny_tagged_indeterminate() {
        let v = fold(
            CombiningAlgorithm::DenyOverrides,
            DefaultVote::Abstain,
            ErrorsMode::Propagate,
            vec![permit(), indet(IndeterminateTag::Deny)],
        );
        assert_eq!(v.decision, Decision::Indeterminate);
    }

    #[test]
    fn only_one_applicable_collides_on_two_decisive_votes() {
        let v = fold(
            CombiningAlgorithm::OnlyOneApplicable,
            DefaultVote::Abstain,
            ErrorsMode::Propagate,
            vec![permit(), deny()],
        );
        assert_eq!(v.decision, Decision::Indeterminate);
    }

    #[test]
    fn only_one_applicable_yields_not_applicable_when_no_member_is_applicable() {
        let v = fold(CombiningAlgorithm::OnlyOneApplicable, DefaultVote::Abstain, ErrorsMode::Propagate, vec![na(), na()]);
        assert_eq!(v.decision, Decision::NotApplicable);
    }

    #[test]
    fn unique_yields_indeterminate_when_no_member_is_applicable() {
        let v = fold(CombiningAlgorithm::Unique, DefaultVote::Abstain, ErrorsMode::Propagate, vec![na(), na()]);
        assert_eq!(v.decision, Decision::Indeterminate);
    }

    #[test]
    fn default_vote_applies_when_every_member_is_not_applicable() {
        let v = fold(CombiningAlgorithm::DenyOverrides, DefaultVote::Permit, ErrorsMode::Propagate, vec![na(), na()]);
        assert_eq!(v.decision, Decision::Permit);
    }

    #[test]
    fn errors_abstain_demotes_indeterminate_to_not_applicable() {
        let v = fold(
            CombiningAlgorithm::DenyOverrides,
            DefaultVote::Abstain,
            ErrorsMode::Abstain,
            vec![indet(IndeterminateTag::Permit)],
        );
        assert_eq!(v.decision, Decision::NotApplicable);
    }

    #[test]
    fn unanimous_strict_requires_matching_obligations() {
        let a = Vote::permit(vec![Value::int(1)], vec![], None, vec![]);
        let b = Vote::permit(vec![Value::int(2)], vec![], None, vec![]);
        let v = fold(
            CombiningAlgorithm::Unanimous { strict: true },
            DefaultVote::Abstain,
            ErrorsMode::Propagate,
            vec![a, b],
        );
        assert_eq!(v.decision, Decision::Indeterminate);
    }

    #[test]
    fn first_applicable_stops_at_first_decisive_vote() {
        let v = fold(
            CombiningAlgorithm::FirstApplicable,
            DefaultVote::Abstain,
            ErrorsMode::Propagate,
            vec![na(), deny(), permit()],
        );
        assert_eq!(v.decision, Decision::Deny);
    }

    #[test]
    fn conflicting_transforms_yield_transformation_uncertainty() {
        let a = Vote::permit(vec![], vec![], Some(Value::int(1)), vec![]);
        let b = Vote::permit(vec![], vec![], Some(Value::int(2)), vec![]);
        let v =
            fold(CombiningAlgorithm::DenyOverrides, DefaultVote::Abstain, ErrorsMode::Propagate, vec![a, b]);
        assert_eq!(v.decision, Decision::Indeterminate);
    }
}
