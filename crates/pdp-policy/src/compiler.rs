//! The policy compiler (C6, spec §4.6): lowers a [`Document`] into a
//! [`CompiledDocument`] classified `Const` / `Pure` / `Stream`, and folds a
//! policy set's members under its combining algorithm (C7).

use crate::combine;
use crate::document::{CombiningAlgorithm, DefaultVote, Document, Entitlement, ErrorsMode, PolicyDoc, PolicySetDoc};
use crate::vote::{IndeterminateTag, Vote};
use futures::stream::{self, BoxStream, StreamExt};
use pdp_core::{Subscription, Value};
use pdp_eval::{
    evaluate, evaluate_stream, is_reserved, EvalContext, EvalMode, Expr, FilterAction, FilterSpec, FunctionContext,
    PathStep,
};
use pdp_functions::{FunctionRegistry, ImportTable};
use std::sync::Arc;

/// A compiled document's per-subscription voter (spec §4.6 step 3/§3
/// "Compiled expression").
#[derive(Clone)]
pub enum CompiledDocument {
    /// Statically evaluated once at compile time; every subscription gets
    /// the same vote.
    Const(Vote),
    /// A function of the evaluation context producing exactly one vote,
    /// with no attribute-finder dependency.
    Pure(Arc<dyn Fn(&EvalContext) -> Vote + Send + Sync>),
    /// A lazy sequence of votes, re-emitted as the document's attribute
    /// subscriptions produce new values.
    Stream(Arc<dyn Fn(&EvalContext) -> BoxStream<'static, Vote> + Send + Sync>),
}

impl CompiledDocument {
    /// Render this document as a vote stream regardless of its own
    /// classification — the uniform shape the combining-algorithm fold and
    /// the orchestrator consume (spec §4.8 step 2: "`ConstVote` yields a
    /// single value; `PureVoter` yields a single value per subscription;
    /// `StreamVoter` yields a stream").
    pub fn as_vote_stream(&self, ctx: &EvalContext) -> BoxStream<'static, Vote> {
        match self {
            CompiledDocument::Const(v) => single(v.clone()),
            CompiledDocument::Pure(f) => single(f(ctx)),
            CompiledDocument::Stream(f) => f(ctx),
        }
    }
}

fn single(v: Vote) -> BoxStream<'static, Vote> {
    stream::once(async move { v }).boxed()
}

fn dedup(names: &mut Vec<String>) {
    let mut seen = Vec::new();
    names.retain(|n| {
        if seen.contains(n) {
            false
        } else {
            seen.push(n.clone());
            true
        }
    });
}

/// Conservative constant-folding classification (spec §4.4 "Compilation
/// classification"): true iff `expr` contains no free variable and no
/// attribute-finder reference, so it evaluates to the same `Value` under
/// any evaluation context.
pub fn is_const(expr: &Expr) -> bool {
    match expr {
        Expr::Null | Expr::Bool(_) | Expr::Num(_) | Expr::Text(_) | Expr::RelativeContext => true,
        Expr::Var(_) => false,
        Expr::Array(items) => items.iter().all(is_const),
        Expr::Object(fields) => fields.iter().all(|(_, v)| is_const(v)),
        Expr::BinArith { lhs, rhs, .. } | Expr::BinBool { lhs, rhs, .. } | Expr::BinRel { lhs, rhs, .. } => {
            is_const(lhs) && is_const(rhs)
        }
        Expr::Regex { text, pattern } => is_const(text) && is_const(pattern),
        Expr::Neg(e) | Expr::Not(e) => is_const(e),
        Expr::Path { base, steps } => {
            is_const(base)
                && steps.iter().all(|s| match s {
                    PathStep::AttributeFinder { .. } => false,
                    PathStep::ExprStep(e) | PathStep::ConditionStep(e) => is_const(e),
                    _ => true,
                })
        }
        Expr::Call { args, .. } => args.iter().all(is_const),
        Expr::AttributeFinder { .. } => false,
        Expr::Transform { base, spec } => is_const(base) && filter_spec_is_const(spec),
        Expr::Subtemplate { base, template } => is_const(base) && is_const(template),
        Expr::VarDef { value, body, .. } => is_const(value) && is_const(body),
        Expr::WhereBody(stmts) => stmts.iter().all(is_const),
    }
}

fn filter_spec_is_const(spec: &FilterSpec) -> bool {
    match spec {
        FilterSpec::Function { extra_args, .. } => extra_args.iter().all(is_const),
        FilterSpec::Remove => true,
        FilterSpec::Rules(rules) => rules.iter().all(|r| {
            r.selector.iter().all(|s| match s {
                PathStep::AttributeFinder { .. } => false,
                PathStep::ExprStep(e) | PathStep::ConditionStep(e) => is_const(e),
                _ => true,
            }) && match &r.action {
                FilterAction::Call { args, .. } => args.iter().all(is_const),
                FilterAction::Remove => true,
            }
        }),
    }
}

/// A throwaway context used only to materialize a provably constant
/// expression once at compile time.
fn dummy_ctx(functions: FunctionContext) -> EvalContext {
    EvalContext::new(
        Arc::new(Subscription::default()),
        functions,
        None,
        None,
        Arc::new(pdp_core::PdpConfig::default()),
        EvalMode::Normal,
    )
}

/// Compile a single [`PolicyDoc`] (spec §4.6 steps 1-3).
pub fn compile_policy(policy: &PolicyDoc, registry: Arc<FunctionRegistry>) -> CompiledDocument {
    let imports = Arc::new(ImportTable::build_with_registry(&policy.imports, &registry));
    let tag = match policy.entitlement {
        Entitlement::Permit => IndeterminateTag::Permit,
        Entitlement::Deny => IndeterminateTag::Deny,
    };

    let mut attrs = crate::attrs::collect(&policy.target);
    attrs.extend(crate::attrs::collect(&policy.where_body));
    for e in &policy.obligations {
        attrs.extend(crate::attrs::collect(e));
    }
    for e in &policy.advice {
        attrs.extend(crate::attrs::collect(e));
    }
    if let Some(t) = &policy.transform {
        attrs.extend(crate::attrs::collect(t));
    }
    dedup(&mut attrs);

    // Spec §4.6 step 1: a `Stream` target is rejected outright. Spec §4.3:
    // attempting attribute access in a target "makes the document
    // Indeterminate" — both land here, as a document that always votes
    // Indeterminate regardless of subscription.
    if imports.has_conflicts() || policy.target.references_attribute_finder() {
        return CompiledDocument::Const(Vote::indeterminate(tag, attrs));
    }

    let functions = FunctionContext { registry: registry.clone(), imports: imports.clone() };
    let target = policy.target.clone();
    let where_body = policy.where_body.clone();
    let obligations = policy.obligations.clone();
    let advice = policy.advice.clone();
    let transform = policy.transform.clone();
    let entitlement = policy.entitlement;

    let body_streams = where_body.references_attribute_finder()
        || obligations.iter().any(Expr::references_attribute_finder)
        || advice.iter().any(Expr::references_attribute_finder)
        || transform.as_ref().map_or(false, Expr::references_attribute_finder);

    let const_eligible = !body_streams
        && is_const(&target)
        && is_const(&where_body)
        && obligations.iter().all(is_const)
        && advice.iter().all(is_const)
        && transform.as_ref().map_or(true, is_const);

    if const_eligible {
        let ctx = dummy_ctx(functions);
        let vote = evaluate_policy_once(&target, entitlement, tag, &where_body, &obligations, &advice, &transform, &ctx, attrs);
        return CompiledDocument::Const(vote);
    }

    if !body_streams {
        let attrs = attrs.clone();
        return CompiledDocument::Pure(Arc::new(move |ctx: &EvalContext| {
            let ctx = with_functions(ctx, &functions);
            evaluate_policy_once(&target, entitlement, tag, &where_body, &obligations, &advice, &transform, &ctx, attrs.clone())
        }));
    }

    CompiledDocument::Stream(Arc::new(move |ctx: &EvalContext| {
        let ctx = with_functions(ctx, &functions);
        let target_val = evaluate(&target, &ctx.as_target());
        match target_val {
            Value::Bool(false) => return single(Vote::not_applicable(attrs.clone())),
            Value::Bool(true) => {}
            _ => return single(Vote::indeterminate(tag, attrs.clone())),
        }

        let mut fields = vec![("where".to_string(), where_body.clone())];
        fields.push(("obligations".to_string(), Expr::Array(obligations.clone())));
        fields.push(("advice".to_string(), Expr::Array(advice.clone())));
        if let Some(t) = &transform {
            fields.push(("transform".to_string(), t.clone()));
        }
        let combined = Expr::Object(fields);
        let attrs = attrs.clone();
        evaluate_stream(&combined, &ctx).map(move |v| decode_body_value(v, entitlement, tag, attrs.clone())).boxed()
    }))
}

/// Clone `ctx` with its function-resolution context swapped for the
/// document's own import table (each document carries its own imports,
/// spec §4.2).
fn with_functions(ctx: &EvalContext, functions: &FunctionContext) -> EvalContext {
    let mut next = ctx.clone();
    next.functions = functions.clone();
    next
}

#[allow(clippy::too_many_arguments)]
fn evaluate_policy_once(
    target: &Expr,
    entitlement: Entitlement,
    tag: IndeterminateTag,
    where_body: &Expr,
    obligations: &[Expr],
    advice: &[Expr],
    transform: &Option<Expr>,
    ctx: &EvalContext,
    attrs: Vec<String>,
) -> Vote {
    match evaluate(target, &ctx.as_target()) {
        Value::Bool(false) => return Vote::not_applicable(attrs),
        Value::Bool(true) => {}
        _ => return Vote::indeterminate(tag, attrs),
    }
    match evaluate(where_body, ctx) {
        Value::Bool(false) => return Vote::not_applicable(attrs),
        Value::Bool(true) => {}
        _ => return Vote::indeterminate(tag, attrs),
    }
    let obligation_vals: Vec<Value> = obligations.iter().map(|e| evaluate(e, ctx)).collect();
    let advice_vals: Vec<Value> = advice.iter().map(|e| evaluate(e, ctx)).collect();
    if obligation_vals.iter().any(Value::is_error) || advice_vals.iter().any(Value::is_error) {
        return Vote::indeterminate(tag, attrs);
    }
    let resource = match transform {
        Some(t) => {
            let v = evaluate(t, ctx);
            if v.is_error() {
                return Vote::indeterminate(tag, attrs);
            }
            Some(v)
        }
        None => None,
    };
    match entitlement {
        Entitlement::Permit => Vote::permit(obligation_vals, advice_vals, resource, attrs),
        Entitlement::Deny => Vote::deny(obligation_vals, advice_vals, resource, attrs),
    }
}

/// Decode one emission of the streaming policy's combined body object back
/// into a [`Vote`] (mirrors [`evaluate_policy_once`] for the streaming path,
/// where where-body/obligations/advice/transform all arrive bundled in one
/// `Value::Object` tick instead of four separate evaluations).
fn decode_body_value(v: Value, entitlement: Entitlement, tag: IndeterminateTag, attrs: Vec<String>) -> Vote {
    if v.is_error() {
        return Vote::indeterminate(tag, attrs);
    }
    let Value::Object(fields) = v else {
        return Vote::indeterminate(tag, attrs);
    };
    match fields.get("where") {
        Some(Value::Bool(false)) => return Vote::not_applicable(attrs),
        Some(Value::Bool(true)) => {}
        _ => return Vote::indeterminate(tag, attrs),
    }
    let obligations = match fields.get("obligations") {
        Some(Value::Array(a)) => a.clone(),
        _ => Vec::new(),
    };
    let advice = match fields.get("advice") {
        Some(Value::Array(a)) => a.clone(),
        _ => Vec::new(),
    };
    if obligations.iter().any(Value::is_error) || advice.iter().any(Value::is_error) {
        return Vote::indeterminate(tag, attrs);
    }
    let resource = match fields.get("transform") {
        Some(v) if v.is_error() => return Vote::indeterminate(tag, attrs),
        Some(v) => Some(v.clone()),
        None => None,
    };
    match entitlement {
        Entitlement::Permit => Vote::permit(obligations, advice, resource, attrs),
        Entitlement::Deny => Vote::deny(obligations, advice, resource, attrs),
    }
}

/// Compile a [`PolicySetDoc`] (spec §4.6 step 4): variable definitions,
/// member documents, and the combined voter under the set's algorithm.
pub fn compile_policy_set(set: &PolicySetDoc, registry: Arc<FunctionRegistry>) -> CompiledDocument {
    let imports = Arc::new(ImportTable::build_with_registry(&set.imports, &registry));

    let mut attrs = crate::attrs::collect(&set.target);
    for (_, e) in &set.variables {
        attrs.extend(crate::attrs::collect(e));
    }
    dedup(&mut attrs);

    // Spec §3: a set's variable bindings "may not use `subject`, `action`,
    // `resource`, `environment` as variable names" — the same reserved-name
    // rule `var` enforces inside a where-body (spec §4.4), applied here at
    // the set-variable declaration site since these bindings never flow
    // through `Expr::VarDef`.
    let reserved_variable = set.variables.iter().any(|(name, _)| is_reserved(name));

    if imports.has_conflicts() || set.target.references_attribute_finder() || reserved_variable {
        return CompiledDocument::Const(Vote::indeterminate(IndeterminateTag::PermitOrDeny, attrs));
    }

    let functions = FunctionContext { registry: registry.clone(), imports };
    let target = set.target.clone();
    let variables = set.variables.clone();
    let algorithm = set.algorithm;
    let default_vote = set.default_vote;
    let errors_mode = set.errors_mode;
    let members: Vec<CompiledDocument> = set.members.iter().map(|m| compile_document(m, registry.clone())).collect();

    let var_streams = variables.iter().any(|(_, e)| e.references_attribute_finder());
    let members_const = members.iter().all(|m| matches!(m, CompiledDocument::Const(_)));

    if !var_streams && members_const && is_const(&target) && variables.iter().all(|(_, e)| is_const(e)) {
        let ctx = dummy_ctx(functions);
        match evaluate(&target, &ctx.as_target()) {
            Value::Bool(false) => return CompiledDocument::Const(Vote::not_applicable(attrs)),
            Value::Bool(true) => {
                let votes: Vec<Vote> = members
                    .iter()
                    .map(|m| match m {
                        CompiledDocument::Const(v) => v.clone(),
                        _ => unreachable!("members_const checked above"),
                    })
                    .collect();
                let mut combined = combine::fold(algorithm, default_vote, errors_mode, votes);
                combined.attributes = merge_attrs(attrs, combined.attributes);
                return CompiledDocument::Const(combined);
            }
            _ => return CompiledDocument::Const(Vote::indeterminate(IndeterminateTag::PermitOrDeny, attrs)),
        }
    }

    let members = Arc::new(members);
    let members_have_streams = members.iter().any(|m| matches!(m, CompiledDocument::Stream(_)));

    if !var_streams && !members_have_streams {
        let attrs = attrs.clone();
        return CompiledDocument::Pure(Arc::new(move |ctx: &EvalContext| {
            let ctx = with_functions(ctx, &functions);
            evaluate_set_once(&target, &variables, &members, algorithm, default_vote, errors_mode, &ctx, attrs.clone())
        }));
    }

    CompiledDocument::Stream(Arc::new(move |ctx: &EvalContext| {
        let ctx = with_functions(ctx, &functions);
        let target_val = evaluate(&target, &ctx.as_target());
        match target_val {
            Value::Bool(false) => return single(Vote::not_applicable(attrs.clone())),
            Value::Bool(true) => {}
            _ => return single(Vote::indeterminate(IndeterminateTag::PermitOrDeny, attrs.clone())),
        }

        if var_streams {
            // Streaming set-level variables are rare; each tick of the
            // combined variable object rebuilds the scope and re-subscribes
            // to every member's vote stream. This merges rather than
            // switches — a superseded tick's member streams are not
            // cancelled, only out-raced by fresher ones — since the spec's
            // enumerated scenarios never exercise a streaming `var`.
            let names: Vec<String> = variables.iter().map(|(n, _)| n.clone()).collect();
            let var_exprs: Vec<Expr> = variables.iter().map(|(_, e)| e.clone()).collect();
            let combined_vars = Expr::Array(var_exprs);
            let members = members.clone();
            let algorithm = algorithm;
            let default_vote = default_vote;
            let errors_mode = errors_mode;
            let attrs = attrs.clone();
            let base_ctx = ctx.clone();
            return evaluate_stream(&combined_vars, &base_ctx)
                .flat_map(move |tick| {
                    let Value::Array(values) = tick else {
                        return single(Vote::indeterminate(IndeterminateTag::PermitOrDeny, attrs.clone()));
                    };
                    let mut var_ctx = base_ctx.clone();
                    for (name, value) in names.iter().zip(values) {
                        var_ctx = var_ctx.with_binding(name.clone(), value);
                    }
                    let member_streams: Vec<_> = members.iter().map(|m| m.as_vote_stream(&var_ctx)).collect();
                    let attrs = attrs.clone();
                    combine_latest_votes(member_streams, move |votes| {
                        let mut combined = combine::fold(algorithm, default_vote, errors_mode, votes.to_vec());
                        combined.attributes = merge_attrs(attrs.clone(), combined.attributes.clone());
                        combined
                    })
                })
                .boxed();
        }

        let mut var_ctx = ctx.clone();
        for (name, expr) in &variables {
            let v = evaluate(expr, &var_ctx);
            var_ctx = var_ctx.with_binding(name.clone(), v);
        }
        let member_streams: Vec<_> = members.iter().map(|m| m.as_vote_stream(&var_ctx)).collect();
        let attrs = attrs.clone();
        combine_latest_votes(member_streams, move |votes| {
            let mut combined = combine::fold(algorithm, default_vote, errors_mode, votes.to_vec());
            combined.attributes = merge_attrs(attrs.clone(), combined.attributes.clone());
            combined
        })
    }))
}

#[allow(clippy::too_many_arguments)]
fn evaluate_set_once(
    target: &Expr,
    variables: &[(String, Expr)],
    members: &[CompiledDocument],
    algorithm: CombiningAlgorithm,
    default_vote: DefaultVote,
    errors_mode: ErrorsMode,
    ctx: &EvalContext,
    attrs: Vec<String>,
) -> Vote {
    match evaluate(target, &ctx.as_target()) {
        Value::Bool(false) => return Vote::not_applicable(attrs),
        Value::Bool(true) => {}
        _ => return Vote::indeterminate(IndeterminateTag::PermitOrDeny, attrs),
    }
    let mut var_ctx = ctx.clone();
    for (name, expr) in variables {
        let v = evaluate(expr, &var_ctx);
        var_ctx = var_ctx.with_binding(name.clone(), v);
    }
    let votes: Vec<Vote> = members
        .iter()
        .map(|m| match m {
            CompiledDocument::Const(v) => v.clone(),
            CompiledDocument::Pure(f) => f(&var_ctx),
            CompiledDocument::Stream(_) => unreachable!("caller only takes this path when no member streams"),
        })
        .collect();
    let mut combined = combine::fold(algorithm, default_vote, errors_mode, votes);
    combined.attributes = merge_attrs(attrs, combined.attributes);
    combined
}

fn merge_attrs(prefix: Vec<String>, rest: Vec<String>) -> Vec<String> {
    let mut out = prefix;
    for a in rest {
        if !out.contains(&a) {
            out.push(a);
        }
    }
    out
}

/// Merge `sources` into a stream that re-emits `combine(&snapshot)` each
/// time any source produces a new vote, once every source has produced at
/// least one (same "combine latest" shape as `pdp_eval::stream`'s, kept as
/// its own copy here since [`Vote`] isn't a `pdp_eval::Value`).
fn combine_latest_votes(
    sources: Vec<BoxStream<'static, Vote>>,
    combine: impl Fn(&[Vote]) -> Vote + Send + Sync + 'static,
) -> BoxStream<'static, Vote> {
    let n = sources.len();
    if n == 0 {
        return single(combine(&[]));
    }
    let tagged = sources.into_iter().enumerate().map(|(i, s)| s.map(move |v| (i, v)).boxed());
    let merged = stream::select_all(tagged);
    let snapshot: Vec<Option<Vote>> = vec![None; n];

    stream::unfold((merged, snapshot, combine), |(mut merged, mut snapshot, combine)| async move {
        loop {
            let (idx, vote) = merged.next().await?;
            snapshot[idx] = Some(vote);
            if snapshot.iter().all(Option::is_some) {
                let votes: Vec<Vote> = snapshot.iter().map(|v| v.clone().unwrap()).collect();
                let out = combine(&votes);
                return Some((out, (merged, snapshot, combine)));
            }
        }
    })
    .boxed()
}

/// Fold a set of already-compiled top-level documents into one vote
/// stream under `algorithm` (spec §4.8 steps 2-3: the orchestrator's own
/// use of the combining-algorithm engine, across whatever a document-index
/// collaborator hands back rather than across one set's declared
/// members).
pub fn fold_votes(
    candidates: &[Arc<CompiledDocument>],
    ctx: &EvalContext,
    algorithm: CombiningAlgorithm,
    default_vote: DefaultVote,
    errors_mode: ErrorsMode,
) -> BoxStream<'static, Vote> {
    let streams: Vec<_> = candidates.iter().map(|d| d.as_vote_stream(ctx)).collect();
    combine_latest_votes(streams, move |votes| combine::fold(algorithm, default_vote, errors_mode, votes.to_vec()))
}

/// Compile any [`Document`] (spec §4.6: dispatches on policy vs. set).
pub fn compile_document(doc: &Document, registry: Arc<FunctionRegistry>) -> CompiledDocument {
    match doc {
        Document::Policy(p) => compile_policy(p, registry),
        Document::PolicySet(s) => compile_policy_set(s, registry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CombiningAlgorithm, DefaultVote, Entitlement, ErrorsMode, PolicyDoc, PolicySetDoc};
    use pdp_core::{Decision, PdpConfig, Subscription};
    use pdp_eval::{ArithOp, RelOp};

    fn policy(name: &str, entitlement: Entitlement, target: Expr, where_body: Expr) -> PolicyDoc {
        PolicyDoc {
            name: name.to_string(),
            target,
            entitlement,
            where_body,
            obligations: vec![],
            advice: vec![],
            transform: None,
            imports: vec![],
        }
    }

    fn always_true() -> Expr {
        Expr::Bool(true)
    }

    fn where_always() -> Expr {
        Expr::WhereBody(vec![Expr::Bool(true)])
    }

    fn run_pure(doc: &CompiledDocument, subject: &str) -> Vote {
        let functions = FunctionContext { registry: Arc::new(FunctionRegistry::new()), imports: Arc::new(ImportTable::build(&[])) };
        let ctx = EvalContext::new(
            Arc::new(Subscription { subject: Value::text(subject), ..Default::default() }),
            functions,
            None,
            None,
            Arc::new(PdpConfig::default()),
            EvalMode::Normal,
        );
        match doc {
            CompiledDocument::Const(v) => v.clone(),
            CompiledDocument::Pure(f) => f(&ctx),
            CompiledDocument::Stream(_) => panic!("expected a non-streaming document"),
        }
    }

    #[test]
    fn bare_permit_policy_is_const() {
        let p = policy("p", Entitlement::Permit, always_true(), where_always());
        let doc = compile_policy(&p, Arc::new(FunctionRegistry::new()));
        assert!(matches!(doc, CompiledDocument::Const(_)));
        assert_eq!(run_pure(&doc, "anyone").decision, Decision::Permit);
    }

    #[test]
    fn where_clause_over_subject_is_pure_and_subscription_sensitive() {
        // where subject == "A"
        let where_body = Expr::WhereBody(vec![Expr::BinRel {
            op: RelOp::Eq,
            lhs: Box::new(Expr::Var("subject".into())),
            rhs: Box::new(Expr::Text("A".into())),
        }]);
        let p = policy("p", Entitlement::Permit, always_true(), where_body);
        let doc = compile_policy(&p, Arc::new(FunctionRegistry::new()));
        assert!(matches!(doc, CompiledDocument::Pure(_)));
        assert_eq!(run_pure(&doc, "A").decision, Decision::Permit);
        assert_eq!(run_pure(&doc, "B").decision, Decision::NotApplicable);
    }

    #[test]
    fn attribute_in_target_is_always_indeterminate() {
        let target = Expr::AttributeFinder {
            entity: Some(Box::new(Expr::Text("test".into()))),
            name: "echo".into(),
            args: vec![],
            opts: Default::default(),
        };
        let p = policy("p", Entitlement::Permit, target, where_always());
        let doc = compile_policy(&p, Arc::new(FunctionRegistry::new()));
        assert_eq!(run_pure(&doc, "x").decision, Decision::Indeterminate);
    }

    #[test]
    fn false_where_statement_is_not_applicable() {
        let where_body = Expr::WhereBody(vec![Expr::BinRel {
            op: RelOp::Eq,
            lhs: Box::new(Expr::Num(1.into())),
            rhs: Box::new(Expr::Num(2.into())),
        }]);
        let p = policy("p", Entitlement::Deny, always_true(), where_body);
        let doc = compile_policy(&p, Arc::new(FunctionRegistry::new()));
        assert_eq!(run_pure(&doc, "x").decision, Decision::NotApplicable);
    }

    #[test]
    fn deny_overrides_set_prefers_deny() {
        let p1 = Document::Policy(policy("p1", Entitlement::Permit, always_true(), where_always()));
        let p2 = Document::Policy(policy("p2", Entitlement::Deny, always_true(), where_always()));
        let set = PolicySetDoc {
            name: "s".into(),
            target: always_true(),
            algorithm: CombiningAlgorithm::DenyOverrides,
            default_vote: DefaultVote::Abstain,
            errors_mode: ErrorsMode::Propagate,
            variables: vec![],
            members: vec![p1, p2],
            imports: vec![],
        };
        let doc = compile_policy_set(&set, Arc::new(FunctionRegistry::new()));
        assert!(matches!(doc, CompiledDocument::Const(_)));
        assert_eq!(run_pure(&doc, "x").decision, Decision::Deny);
    }

    #[test]
    fn permit_overrides_set_with_subscription_dependent_member_is_pure() {
        let p1 = Document::Policy(policy("p1", Entitlement::Permit, always_true(), where_always()));
        let false_target = Expr::BinRel {
            op: RelOp::Eq,
            lhs: Box::new(Expr::Bool(true)),
            rhs: Box::new(Expr::Bool(false)),
        };
        let p2 = Document::Policy(policy("p2", Entitlement::Permit, false_target, where_always()));
        let set = PolicySetDoc {
            name: "s".into(),
            target: always_true(),
            algorithm: CombiningAlgorithm::PermitOverrides,
            default_vote: DefaultVote::Abstain,
            errors_mode: ErrorsMode::Propagate,
            variables: vec![],
            members: vec![p1, p2],
            imports: vec![],
        };
        let doc = compile_policy_set(&set, Arc::new(FunctionRegistry::new()));
        assert_eq!(run_pure(&doc, "x").decision, Decision::Permit);
    }

    #[test]
    fn var_def_is_visible_to_later_members_via_scope() {
        // var v = 1 + 1; policy permitting where v == 2.
        let where_body = Expr::WhereBody(vec![Expr::BinRel {
            op: RelOp::Eq,
            lhs: Box::new(Expr::Var("v".into())),
            rhs: Box::new(Expr::Num(2.into())),
        }]);
        let p1 = Document::Policy(policy("p1", Entitlement::Permit, always_true(), where_body));
        let set = PolicySetDoc {
            name: "s".into(),
            target: always_true(),
            algorithm: CombiningAlgorithm::DenyOverrides,
            default_vote: DefaultVote::Abstain,
            errors_mode: ErrorsMode::Propagate,
            variables: vec![(
                "v".into(),
                Expr::BinArith { op: ArithOp::Add, lhs: Box::new(Expr::Num(1.into())), rhs: Box::new(Expr::Num(1.into())) },
            )],
            members: vec![p1],
            imports: vec![],
        };
        let doc = compile_policy_set(&set, Arc::new(FunctionRegistry::new()));
        assert_eq!(run_pure(&doc, "x").decision, Decision::Permit);
    }

    #[test]
    fn set_variable_named_like_a_subscription_field_is_indeterminate() {
        let p1 = Document::Policy(policy("p1", Entitlement::Permit, always_true(), where_always()));
        let set = PolicySetDoc {
            name: "s".into(),
            target: always_true(),
            algorithm: CombiningAlgorithm::DenyOverrides,
            default_vote: DefaultVote::Abstain,
            errors_mode: ErrorsMode::Propagate,
            variables: vec![("resource".into(), Expr::Num(1.into()))],
            members: vec![p1],
            imports: vec![],
        };
        let doc = compile_policy_set(&set, Arc::new(FunctionRegistry::new()));
        assert_eq!(run_pure(&doc, "x").decision, Decision::Indeterminate);
    }

    #[tokio::test]
    async fn streaming_where_clause_re_emits_on_attribute_change() {
        use pdp_attributes::{AttributeBroker, AttributeFinderRegistry};
        use std::time::Duration;

        // where <portal> == "stable"; a streaming finder flips values.
        struct FlippingFinder;
        #[async_trait::async_trait]
        impl pdp_attributes::finder::AttributeFinder for FlippingFinder {
            async fn fetch(&self, _entity: &Value, _args: &[Value], _variables: &[(String, Value)]) -> Result<Value, pdp_core::EvalError> {
                use std::sync::atomic::{AtomicUsize, Ordering};
                static CALLS: AtomicUsize = AtomicUsize::new(0);
                let n = CALLS.fetch_add(1, Ordering::SeqCst);
                let values = ["unstable", "stable", "unstable"];
                Ok(Value::text(values[n.min(values.len() - 1)]))
            }
        }

        let where_body = Expr::WhereBody(vec![Expr::BinRel {
            op: RelOp::Eq,
            lhs: Box::new(Expr::AttributeFinder { entity: None, name: "portal".into(), args: vec![], opts: Default::default() }),
            rhs: Box::new(Expr::Text("stable".into())),
        }]);
        let p = policy("p", Entitlement::Permit, always_true(), where_body);
        let doc = compile_policy(&p, Arc::new(FunctionRegistry::new()));
        let CompiledDocument::Stream(f) = doc else { panic!("expected a streaming document") };

        let mut finders = AttributeFinderRegistry::new();
        finders.register("portal", Arc::new(FlippingFinder));
        let broker = AttributeBroker::new(Duration::ZERO);
        let functions = FunctionContext { registry: Arc::new(FunctionRegistry::new()), imports: Arc::new(ImportTable::build(&[])) };
        let ctx = EvalContext::new(
            Arc::new(Subscription::default()),
            functions,
            Some(Arc::new(broker)),
            Some(Arc::new(finders)),
            Arc::new(PdpConfig { default_timing: pdp_core::AttributeTiming { poll_interval: Duration::from_millis(10), ..Default::default() }, ..Default::default() }),
            EvalMode::Normal,
        );

        let mut s = f(&ctx);
        assert_eq!(tokio::time::timeout(Duration::from_secs(1), s.next()).await.unwrap().unwrap().decision, Decision::NotApplicable);
        assert_eq!(tokio::time::timeout(Duration::from_secs(1), s.next()).await.unwrap().unwrap().decision, Decision::Permit);
        assert_eq!(tokio::time::timeout(Duration::from_secs(1), s.next()).await.unwrap().unwrap().decision, Decision::NotApplicable);
    }
}
