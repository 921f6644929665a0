//! Built-in demonstration scenarios (spec §8's concrete end-to-end
//! examples), wired entirely in memory — standing in for the parser and
//! policy-repository collaborators this implementation treats as out of
//! scope.

use pdp_attributes::{AttributeBroker, AttributeFinder, AttributeFinderRegistry};
use pdp_core::{AttributeTiming, EvalError, PdpConfig, Subscription, Value};
use pdp_eval::{AttributeOpts, Expr, FilterAction, FilterRule, FilterSpec, PathStep, RelOp};
use pdp_functions::{builtins, FunctionRegistry};
use pdp_orchestrator::{AllDocuments, Pdp};
use pdp_policy::{compile_policy, compile_policy_set, CombiningAlgorithm, DefaultVote, Entitlement, ErrorsMode, PolicyDoc, PolicySetDoc};
use std::sync::Arc;
use std::time::Duration;

/// A fully-wired scenario ready for `Pdp::decisions`.
pub struct Scenario {
    /// The orchestrator, already holding every document and finder the
    /// scenario needs.
    pub pdp: Pdp<AllDocuments>,
    /// The subscription to evaluate it against.
    pub subscription: Subscription,
}

/// The names `run --scenario` accepts.
pub fn names() -> Vec<&'static str> {
    vec!["bare-permit", "deny-overrides", "echo-transform", "streaming-portal"]
}

/// Build the named scenario, or `None` if `name` isn't one of [`names`].
pub fn build(name: &str) -> Option<Scenario> {
    match name {
        "bare-permit" => Some(bare_permit()),
        "deny-overrides" => Some(deny_overrides()),
        "echo-transform" => Some(echo_transform()),
        "streaming-portal" => Some(streaming_portal()),
        _ => None,
    }
}

fn always_true() -> Expr {
    Expr::Bool(true)
}

fn where_always() -> Expr {
    Expr::WhereBody(vec![Expr::Bool(true)])
}

fn policy(name: &str, entitlement: Entitlement, target: Expr, where_body: Expr) -> PolicyDoc {
    PolicyDoc { name: name.to_string(), target, entitlement, where_body, obligations: vec![], advice: vec![], transform: None, imports: vec![] }
}

/// Spec §8 scenario 1: `policy "p" permit` against any subscription.
fn bare_permit() -> Scenario {
    let registry = Arc::new(FunctionRegistry::new());
    let doc = compile_policy(&policy("p", Entitlement::Permit, always_true(), where_always()), registry.clone());
    let pdp = Pdp::new(AllDocuments::new(vec![Arc::new(doc)]), registry, None, None, Arc::new(PdpConfig::default()));
    Scenario { pdp, subscription: Subscription::default() }
}

/// Spec §8 scenario 3: `set "s" deny-overrides { p1 permit, p2 deny }` -> DENY.
fn deny_overrides() -> Scenario {
    let registry = Arc::new(FunctionRegistry::new());
    let p1 = pdp_policy::Document::Policy(policy("p1", Entitlement::Permit, always_true(), where_always()));
    let p2 = pdp_policy::Document::Policy(policy("p2", Entitlement::Deny, always_true(), where_always()));
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
    let doc = compile_policy_set(&set, registry.clone());
    let pdp = Pdp::new(AllDocuments::new(vec![Arc::new(doc)]), registry, None, None, Arc::new(PdpConfig::default()));
    Scenario { pdp, subscription: Subscription::default() }
}

/// Spec §8 scenario 5: `transform [\"foo\",\"bars\"] |- {each @.<echo> :
/// simple.length}` with an `echo` finder returning its input unchanged ->
/// `resource = [3, 4]`.
fn echo_transform() -> Scenario {
    struct EchoFinder;
    #[async_trait::async_trait]
    impl AttributeFinder for EchoFinder {
        async fn fetch(&self, entity: &Value, _args: &[Value], _variables: &[(String, Value)]) -> Result<Value, EvalError> {
            Ok(entity.clone())
        }
    }

    let mut registry = FunctionRegistry::new();
    registry.register(builtins::simple_library());
    let registry = Arc::new(registry);
    let mut p = policy("p", Entitlement::Permit, always_true(), where_always());
    p.transform = Some(Expr::Transform {
        base: Box::new(Expr::Var("resource".into())),
        spec: FilterSpec::Rules(vec![FilterRule {
            each: true,
            selector: vec![PathStep::AttributeFinder { name: "echo".into(), args: vec![], opts: AttributeOpts::default() }],
            action: FilterAction::Call { name: "simple.length".into(), args: vec![Expr::RelativeContext] },
        }]),
    });
    let doc = compile_policy(&p, registry.clone());

    let mut finders = AttributeFinderRegistry::new();
    finders.register("echo", Arc::new(EchoFinder));
    let broker = Arc::new(AttributeBroker::new(Duration::ZERO));
    let pdp = Pdp::new(AllDocuments::new(vec![Arc::new(doc)]), registry, Some(broker), Some(Arc::new(finders)), Arc::new(PdpConfig::default()));
    let subscription =
        Subscription { resource: Value::Array(vec![Value::text("foo"), Value::text("bars")]), ..Default::default() };
    Scenario { pdp, subscription }
}

/// Spec §8 scenario 9: a streaming `<portal>` finder flips
/// `"unstable", "stable", "unstable"`, so the decision stream is
/// `NOT_APPLICABLE, PERMIT, NOT_APPLICABLE`.
fn streaming_portal() -> Scenario {
    struct FlippingFinder;
    #[async_trait::async_trait]
    impl AttributeFinder for FlippingFinder {
        async fn fetch(&self, _entity: &Value, _args: &[Value], _variables: &[(String, Value)]) -> Result<Value, EvalError> {
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
    let registry = Arc::new(FunctionRegistry::new());
    let doc = compile_policy(&policy("p", Entitlement::Permit, always_true(), where_body), registry.clone());

    let mut finders = AttributeFinderRegistry::new();
    finders.register("portal", Arc::new(FlippingFinder));
    let broker = Arc::new(AttributeBroker::new(Duration::ZERO));
    let config = Arc::new(PdpConfig {
        default_timing: AttributeTiming { poll_interval: Duration::from_millis(20), ..Default::default() },
        ..Default::default()
    });
    let pdp = Pdp::new(AllDocuments::new(vec![Arc::new(doc)]), registry, Some(broker), Some(Arc::new(finders)), config);
    Scenario { pdp, subscription: Subscription::default() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pdp_core::Decision;

    #[tokio::test]
    async fn bare_permit_scenario_emits_permit() {
        let scenario = bare_permit();
        let mut decisions = scenario.pdp.decisions(scenario.subscription);
        assert_eq!(decisions.next().await.unwrap().decision, Decision::Permit);
    }

    #[tokio::test]
    async fn streaming_portal_scenario_emits_the_three_documented_decisions() {
        let scenario = streaming_portal();
        let mut decisions = scenario.pdp.decisions(scenario.subscription);
        let expected = [Decision::NotApplicable, Decision::Permit, Decision::NotApplicable];
        for want in expected {
            let got = tokio::time::timeout(Duration::from_secs(1), decisions.next()).await.unwrap().unwrap();
            assert_eq!(got.decision, want);
        }
    }

    #[tokio::test]
    async fn echo_transform_scenario_computes_lengths_via_the_echo_finder() {
        let scenario = echo_transform();
        let mut decisions = scenario.pdp.decisions(scenario.subscription);
        let decision = decisions.next().await.unwrap();
        assert_eq!(decision.decision, Decision::Permit);
        assert_eq!(decision.resource, Value::Array(vec![Value::int(3), Value::int(4)]));
    }

    #[test]
    fn every_advertised_name_builds() {
        for name in names() {
            assert!(build(name).is_some(), "scenario {name} failed to build");
        }
    }
}
