//! A single document's contribution to a combining-algorithm fold
//! (spec §4.7).

use pdp_core::{Decision, Value};

/// The decision an `INDETERMINATE` vote would have produced absent the
/// error that produced it — drives extended-indeterminate propagation in
/// the overriding algorithms (spec §4.7 "Vote outcome tag").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndeterminateTag {
    Permit,
    Deny,
    /// Only a policy *set* vote can end up tagged this way, when its own
    /// members disagree on what they would have been.
    PermitOrDeny,
}

impl IndeterminateTag {
    /// Widen two tags to the tag a combining algorithm should propagate
    /// when folding more than one indeterminate vote together (used by
    /// the unanimous/unique algorithms, which surface a single combined
    /// indeterminate rather than one per source policy).
    pub fn widen(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            IndeterminateTag::PermitOrDeny
        }
    }
}

/// One document's vote: a decision plus the constraints it would
/// contribute if it ends up a *contributing* vote in the combined result
/// (spec §4.7 "Constraint aggregation").
#[derive(Debug, Clone)]
pub struct Vote {
    pub decision: Decision,
    /// Set only when `decision == Indeterminate`.
    pub tag: Option<IndeterminateTag>,
    pub obligations: Vec<Value>,
    pub advice: Vec<Value>,
    /// `Some` only when this vote proposes a resource transform.
    pub resource: Option<Value>,
    /// Fully qualified names of the attribute finders this vote's target
    /// and body referenced (spec §4.7 "aggregation of contributing
    /// attributes" — see DESIGN.md for why this tracks names rather than
    /// live subscription keys).
    pub attributes: Vec<String>,
}

impl Vote {
    pub fn permit(obligations: Vec<Value>, advice: Vec<Value>, resource: Option<Value>, attributes: Vec<String>) -> Self {
        Self { decision: Decision::Permit, tag: None, obligations, advice, resource, attributes }
    }

    pub fn deny(obligations: Vec<Value>, advice: Vec<Value>, resource: Option<Value>, attributes: Vec<String>) -> Self {
        Self { decision: Decision::Deny, tag: None, obligations, advice, resource, attributes }
    }

    pub fn not_applicable(attributes: Vec<String>) -> Self {
        Self { decision: Decision::NotApplicable, tag: None, obligations: vec![], advice: vec![], resource: None, attributes }
    }

    pub fn indeterminate(tag: IndeterminateTag, attributes: Vec<String>) -> Self {
        Self { decision: Decision::Indeterminate, tag: Some(tag), obligations: vec![], advice: vec![], resource: None, attributes }
    }

    /// Whether this vote's extended-indeterminate tag could have been a
    /// `PERMIT` (i.e. is `Permit` or `PermitOrDeny`).
    pub fn could_have_been_permit(&self) -> bool {
        matches!(self.tag, Some(IndeterminateTag::Permit | IndeterminateTag::PermitOrDeny))
    }

    /// Whether this vote's extended-indeterminate tag could have been a
    /// `DENY` (i.e. is `Deny` or `PermitOrDeny`).
    pub fn could_have_been_deny(&self) -> bool {
        matches!(self.tag, Some(IndeterminateTag::Deny | IndeterminateTag::PermitOrDeny))
    }
}
