//! PDP orchestrator (C8, spec §4.8): resolves the compiled top-level
//! documents a subscription is evaluated against, folds their votes
//! under the top-level combining algorithm, and emits a deduplicated
//! authorization decision stream.

#![deny(unsafe_code)]

use futures::stream::{self, BoxStream, StreamExt};
use pdp_attributes::{AttributeBroker, AttributeFinderRegistry};
use pdp_core::{AuthorizationDecision, PdpConfig, Subscription, Value};
use pdp_eval::{EvalContext, EvalMode, FunctionContext};
use pdp_functions::{FunctionRegistry, ImportTable};
use pdp_policy::{fold_votes, CombiningAlgorithm, CompiledDocument, DefaultVote, ErrorsMode, Vote};
use std::sync::Arc;

/// Resolves the compiled top-level documents a subscription should be
/// evaluated against (spec §4.8 step 1 / §4.8.1's "document-index
/// collaborator").
pub trait DocumentIndex: Send + Sync {
    /// The top-level documents applicable to `subscription`, in the
    /// order they should be folded.
    fn candidates(&self, subscription: &Subscription) -> Vec<Arc<CompiledDocument>>;
}

/// The trivial document index (spec §4.8.1): every compiled top-level
/// document is always a candidate. Indexing strategy is explicitly out
/// of scope; a real deployment swaps this for a real index without
/// touching C1-C7.
#[derive(Clone, Default)]
pub struct AllDocuments {
    documents: Vec<Arc<CompiledDocument>>,
}

impl AllDocuments {
    /// An index over a fixed set of compiled documents.
    pub fn new(documents: Vec<Arc<CompiledDocument>>) -> Self {
        Self { documents }
    }
}

impl DocumentIndex for AllDocuments {
    fn candidates(&self, _subscription: &Subscription) -> Vec<Arc<CompiledDocument>> {
        self.documents.clone()
    }
}

/// The PDP orchestrator: a document index plus the shared function and
/// attribute brokers every compiled document evaluates against.
#[derive(Clone)]
pub struct Pdp<I> {
    index: I,
    functions: Arc<FunctionRegistry>,
    attributes: Option<Arc<AttributeBroker>>,
    attribute_finders: Option<Arc<AttributeFinderRegistry>>,
    config: Arc<PdpConfig>,
}

impl<I: DocumentIndex> Pdp<I> {
    /// Build an orchestrator over `index`, resolving functions through
    /// `functions` and (if given) attributes through `attributes` /
    /// `attribute_finders`.
    pub fn new(
        index: I,
        functions: Arc<FunctionRegistry>,
        attributes: Option<Arc<AttributeBroker>>,
        attribute_finders: Option<Arc<AttributeFinderRegistry>>,
        config: Arc<PdpConfig>,
    ) -> Self {
        Self { index, functions, attributes, attribute_finders, config }
    }

    /// The lazy decision sequence for `subscription` (spec §4.8 steps
    /// 1-5): resolve candidates, fold their vote streams under the
    /// top-level algorithm, convert to decisions, and suppress
    /// consecutive duplicates.
    pub fn decisions(&self, subscription: Subscription) -> BoxStream<'static, AuthorizationDecision> {
        let algorithm =
            CombiningAlgorithm::parse(&self.config.top_level_algorithm).unwrap_or(CombiningAlgorithm::DenyOverrides);
        let candidates = self.index.candidates(&subscription);

        let functions = FunctionContext { registry: self.functions.clone(), imports: Arc::new(ImportTable::build(&[])) };
        let ctx = EvalContext::new(
            Arc::new(subscription),
            functions,
            self.attributes.clone(),
            self.attribute_finders.clone(),
            self.config.clone(),
            EvalMode::Normal,
        );

        // Top-level documents have already applied their own declared
        // default-vote/errors-mode inside `compile_policy_set`; the PDP
        // configuration's own fold always abstains on NOT_APPLICABLE and
        // propagates INDETERMINATE (spec §4.8 step 3 names only the
        // algorithm as configurable at this level).
        let votes = fold_votes(&candidates, &ctx, algorithm, DefaultVote::Abstain, ErrorsMode::Propagate);
        dedup_consecutive(votes.map(vote_to_decision).boxed())
    }
}

fn vote_to_decision(vote: Vote) -> AuthorizationDecision {
    AuthorizationDecision {
        decision: vote.decision,
        obligations: vote.obligations,
        advice: vote.advice,
        resource: vote.resource.unwrap_or(Value::Undefined),
    }
}

/// Suppress consecutive identical emits (spec §4.8 step 5 / §8 "Consecutive
/// identical decision emits are suppressed by the orchestrator").
fn dedup_consecutive(decisions: BoxStream<'static, AuthorizationDecision>) -> BoxStream<'static, AuthorizationDecision> {
    stream::unfold((decisions, None::<AuthorizationDecision>), |(mut decisions, last)| async move {
        loop {
            let next = decisions.next().await?;
            if let Some(prev) = &last {
                if prev.same_as(&next) {
                    continue;
                }
            }
            let emitted = next.clone();
            return Some((emitted, (decisions, Some(next))));
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdp_core::Decision;
    use pdp_eval::{Expr, RelOp};
    use pdp_policy::{compile_policy, Entitlement, PolicyDoc};
    use std::time::Duration;

    fn always_true() -> Expr {
        Expr::Bool(true)
    }

    fn where_always() -> Expr {
        Expr::WhereBody(vec![Expr::Bool(true)])
    }

    fn policy(name: &str, entitlement: Entitlement, target: Expr, where_body: Expr) -> PolicyDoc {
        PolicyDoc { name: name.to_string(), target, entitlement, where_body, obligations: vec![], advice: vec![], transform: None, imports: vec![] }
    }

    fn pdp(documents: Vec<Arc<CompiledDocument>>) -> Pdp<AllDocuments> {
        Pdp::new(AllDocuments::new(documents), Arc::new(FunctionRegistry::new()), None, None, Arc::new(PdpConfig::default()))
    }

    #[tokio::test]
    async fn bare_permit_policy_emits_a_single_permit() {
        let registry = Arc::new(FunctionRegistry::new());
        let doc = compile_policy(&policy("p", Entitlement::Permit, always_true(), where_always()), registry);
        let orchestrator = pdp(vec![Arc::new(doc)]);

        let mut decisions = orchestrator.decisions(Subscription::default());
        let first = decisions.next().await.unwrap();
        assert_eq!(first.decision, Decision::Permit);
        assert!(decisions.next().await.is_none());
    }

    #[tokio::test]
    async fn deny_overrides_across_candidates() {
        let registry = Arc::new(FunctionRegistry::new());
        let p1 = compile_policy(&policy("p1", Entitlement::Permit, always_true(), where_always()), registry.clone());
        let p2 = compile_policy(&policy("p2", Entitlement::Deny, always_true(), where_always()), registry);
        let orchestrator = pdp(vec![Arc::new(p1), Arc::new(p2)]);

        let mut decisions = orchestrator.decisions(Subscription::default());
        let first = decisions.next().await.unwrap();
        assert_eq!(first.decision, Decision::Deny);
    }

    #[tokio::test]
    async fn streaming_attribute_reemits_as_portal_flips() {
        use pdp_attributes::finder::AttributeFinder;
        use pdp_core::EvalError;

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
            default_timing: pdp_core::AttributeTiming { poll_interval: Duration::from_millis(10), ..Default::default() },
            ..Default::default()
        });
        let orchestrator =
            Pdp::new(AllDocuments::new(vec![Arc::new(doc)]), registry, Some(broker), Some(Arc::new(finders)), config);

        let mut decisions = orchestrator.decisions(Subscription::default());
        let d1 = tokio::time::timeout(Duration::from_secs(1), decisions.next()).await.unwrap().unwrap();
        let d2 = tokio::time::timeout(Duration::from_secs(1), decisions.next()).await.unwrap().unwrap();
        let d3 = tokio::time::timeout(Duration::from_secs(1), decisions.next()).await.unwrap().unwrap();
        assert_eq!(d1.decision, Decision::NotApplicable);
        assert_eq!(d2.decision, Decision::Permit);
        assert_eq!(d3.decision, Decision::NotApplicable);
    }

    #[tokio::test]
    async fn dedup_collapses_identical_consecutive_decisions() {
        let decisions = vec![
            AuthorizationDecision::simple(Decision::Permit),
            AuthorizationDecision::simple(Decision::Permit),
            AuthorizationDecision::simple(Decision::NotApplicable),
        ];
        let deduped = dedup_consecutive(stream::iter(decisions).boxed()).collect::<Vec<_>>().await;
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].decision, Decision::Permit);
        assert_eq!(deduped[1].decision, Decision::NotApplicable);
    }
}
