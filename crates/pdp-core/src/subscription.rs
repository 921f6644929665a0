//! The authorization subscription record (spec §3).

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// An immutable authorization subscription: subject, action, resource, and
/// environment, each defaulting to `Undefined` when absent from the wire
/// request.
#[derive(Debug, Clone, Default)]
pub struct Subscription {
    /// Who is acting.
    pub subject: Value,
    /// What they're trying to do.
    pub action: Value,
    /// What they're acting on.
    pub resource: Value,
    /// Ambient context (time of day, IP, ...).
    pub environment: Value,
}

impl Subscription {
    /// Resolve one of the four reserved subscription fields by name, or
    /// `None` if `name` isn't one of them (the caller then looks elsewhere).
    pub fn field(&self, name: &str) -> Option<&Value> {
        match name {
            "subject" => Some(&self.subject),
            "action" => Some(&self.action),
            "resource" => Some(&self.resource),
            "environment" => Some(&self.environment),
            _ => None,
        }
    }
}

/// Wire-level subscription request: an object with optional `subject`,
/// `action`, `resource`, `environment` keys (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    #[serde(default)]
    pub subject: Option<serde_json::Value>,
    #[serde(default)]
    pub action: Option<serde_json::Value>,
    #[serde(default)]
    pub resource: Option<serde_json::Value>,
    #[serde(default)]
    pub environment: Option<serde_json::Value>,
}

impl From<SubscriptionRequest> for Subscription {
    fn from(r: SubscriptionRequest) -> Self {
        Subscription {
            subject: r.subject.as_ref().map(Value::from_json).unwrap_or(Value::Undefined),
            action: r.action.as_ref().map(Value::from_json).unwrap_or(Value::Undefined),
            resource: r.resource.as_ref().map(Value::from_json).unwrap_or(Value::Undefined),
            environment: r.environment.as_ref().map(Value::from_json).unwrap_or(Value::Undefined),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_undefined() {
        let req: SubscriptionRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        let sub: Subscription = req.into();
        assert!(sub.subject.is_undefined());
        assert!(sub.environment.is_undefined());
    }

    #[test]
    fn field_lookup_by_name() {
        let sub = Subscription { subject: Value::text("alice"), ..Default::default() };
        assert_eq!(sub.field("subject"), Some(&Value::text("alice")));
        assert_eq!(sub.field("nonsense"), None);
    }
}
