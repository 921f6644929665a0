//! Attribute subscription keys (spec §3): the tuple two requests must match
//! on to share a station.

use pdp_core::Value;

/// Render a `Value` into a string that's equal iff the values are equal
/// under spec §4.1 deep-equality closely enough for key purposes (`Error`
/// values never legitimately appear in a key's entity/args, so a coarse
/// fallback string for them is fine — it only has to be consistent).
fn stringify(v: &Value) -> String {
    match v.to_json() {
        Some(j) => j.to_string(),
        None if v.is_undefined() => "\u{0}undefined".to_string(),
        None => "\u{0}error".to_string(),
    }
}

/// The tuple keying a shared station (spec §3): PDP configuration,
/// attribute name, the entity the attribute is evaluated against (or the
/// environment sentinel), the argument list, and a snapshot of whichever
/// set-level variables the finder invocation closed over. Freshness is
/// deliberately not part of this key — a `fresh=true` request never
/// consults the shared table at all (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeKey {
    pdp_configuration_id: String,
    attribute_name: String,
    entity: String,
    args: Vec<String>,
    variables: Vec<(String, String)>,
}

/// Marker entity value used for environment-scoped attribute finders
/// (`<name(args)>`, no leading entity), as opposed to entity-scoped ones
/// (`entity.<name(args)>`).
pub const ENVIRONMENT_SENTINEL: &str = "\u{0}environment";

impl AttributeKey {
    /// Build a key. `entity` is `None` for the environment form.
    pub fn new(
        pdp_configuration_id: impl Into<String>,
        attribute_name: impl Into<String>,
        entity: Option<&Value>,
        args: &[Value],
        variables: &[(String, Value)],
    ) -> Self {
        let mut variables: Vec<(String, String)> =
            variables.iter().map(|(k, v)| (k.clone(), stringify(v))).collect();
        variables.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            pdp_configuration_id: pdp_configuration_id.into(),
            attribute_name: attribute_name.into(),
            entity: entity.map(stringify).unwrap_or_else(|| ENVIRONMENT_SENTINEL.to_string()),
            args: args.iter().map(stringify).collect(),
            variables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_inputs_produce_equal_keys() {
        let a = AttributeKey::new("pdp1", "risk_score", Some(&Value::text("alice")), &[], &[]);
        let b = AttributeKey::new("pdp1", "risk_score", Some(&Value::text("alice")), &[], &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn variable_snapshot_order_does_not_affect_key_equality() {
        let vars_a = [("x".to_string(), Value::int(1)), ("y".to_string(), Value::int(2))];
        let vars_b = [("y".to_string(), Value::int(2)), ("x".to_string(), Value::int(1))];
        let a = AttributeKey::new("pdp1", "f", None, &[], &vars_a);
        let b = AttributeKey::new("pdp1", "f", None, &[], &vars_b);
        assert_eq!(a, b);
    }

    #[test]
    fn different_entities_produce_different_keys() {
        let a = AttributeKey::new("pdp1", "f", Some(&Value::text("alice")), &[], &[]);
        let b = AttributeKey::new("pdp1", "f", Some(&Value::text("bob")), &[], &[]);
        assert_ne!(a, b);
    }
}
