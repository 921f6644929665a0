//! The authorization decision record (spec §3/§6).

use crate::value::Value;
use serde::Serialize;

/// The four decision values a PDP may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Grant the request.
    Permit,
    /// Refuse the request.
    Deny,
    /// No policy matched.
    NotApplicable,
    /// A matching policy could not be evaluated to a decisive answer.
    Indeterminate,
}

/// A complete authorization decision: the decision value plus any
/// obligations, advice, and resource transformation.
///
/// Invariants (spec §3): obligations/advice are only non-empty when
/// `decision` is `Permit` or `Deny`; `resource` is `Value::Undefined`
/// unless exactly one contributing policy produced a transform.
#[derive(Debug, Clone)]
pub struct AuthorizationDecision {
    /// The decision value.
    pub decision: Decision,
    /// Obligations the PEP must execute for the decision to stand.
    pub obligations: Vec<Value>,
    /// Advice the PEP may execute; non-binding.
    pub advice: Vec<Value>,
    /// The transformed resource, or `Value::Undefined` for "no transform".
    pub resource: Value,
}

impl AuthorizationDecision {
    /// A bare decision with no obligations, advice, or transform.
    pub fn simple(decision: Decision) -> Self {
        Self { decision, obligations: Vec::new(), advice: Vec::new(), resource: Value::Undefined }
    }

    /// `NOT_APPLICABLE` with no constraints — the PDP's "nothing matched" answer.
    pub fn not_applicable() -> Self {
        Self::simple(Decision::NotApplicable)
    }

    /// `INDETERMINATE` with no constraints — the PDP's fail-closed answer.
    pub fn indeterminate() -> Self {
        Self::simple(Decision::Indeterminate)
    }

    /// Structural equality used by the orchestrator to suppress consecutive
    /// identical emits (spec §4.8 step 5, §8 "consecutive identical decision
    /// emits are suppressed").
    pub fn same_as(&self, other: &Self) -> bool {
        self.decision == other.decision
            && self.resource == other.resource
            && self.obligations.len() == other.obligations.len()
            && self.obligations.iter().zip(&other.obligations).all(|(a, b)| a == b)
            && self.advice.len() == other.advice.len()
            && self.advice.iter().zip(&other.advice).all(|(a, b)| a == b)
    }

    /// Render as the wire JSON object from spec §6: `obligations`/`advice`
    /// are omitted when empty, `resource` is omitted when `Undefined`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut m = serde_json::Map::new();
        let decision_str = match self.decision {
            Decision::Permit => "PERMIT",
            Decision::Deny => "DENY",
            Decision::NotApplicable => "NOT_APPLICABLE",
            Decision::Indeterminate => "INDETERMINATE",
        };
        m.insert("decision".into(), serde_json::Value::String(decision_str.into()));
        if !self.obligations.is_empty() {
            let arr: Vec<_> = self.obligations.iter().filter_map(Value::to_json).collect();
            m.insert("obligations".into(), serde_json::Value::Array(arr));
        }
        if !self.advice.is_empty() {
            let arr: Vec<_> = self.advice.iter().filter_map(Value::to_json).collect();
            m.insert("advice".into(), serde_json::Value::Array(arr));
        }
        if let Some(r) = self.resource.to_json() {
            m.insert("resource".into(), r);
        }
        serde_json::Value::Object(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permit_with_no_constraints_omits_fields() {
        let d = AuthorizationDecision::simple(Decision::Permit);
        let j = d.to_json();
        assert_eq!(j, serde_json::json!({"decision": "PERMIT"}));
    }

    #[test]
    fn resource_present_when_transformed() {
        let d = AuthorizationDecision {
            decision: Decision::Permit,
            obligations: vec![],
            advice: vec![],
            resource: Value::Array(vec![Value::int(3), Value::int(4)]),
        };
        let j = d.to_json();
        assert_eq!(j["resource"], serde_json::json!([3, 4]));
    }

    #[test]
    fn same_as_ignores_nothing_but_the_four_fields() {
        let a = AuthorizationDecision::simple(Decision::Deny);
        let b = AuthorizationDecision::simple(Decision::Deny);
        assert!(a.same_as(&b));
        let c = AuthorizationDecision::simple(Decision::Permit);
        assert!(!a.same_as(&c));
    }
}
