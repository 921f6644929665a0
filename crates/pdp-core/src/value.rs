//! The JSON-like value model (C1): `Value`, its deep-equality rules, and
//! conversion to/from wire JSON.

use crate::error::EvalError;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

/// An evaluation failure carried inline as a `Value`.
///
/// `cause` links a failure back to the lower-level error that produced it
/// (e.g. a bad attribute-finder invocation behind a `Timeout`), mirroring
/// the `message`/`cause` pair spec §7 calls for.
#[derive(Debug, Clone)]
pub struct ErrorValue {
    /// Human-readable failure description; `EvalError::to_string()`.
    pub message: String,
    /// The taxonomy entry this failure maps onto.
    pub kind: EvalError,
    /// Optional lower-level cause (e.g. a wrapped attribute-broker failure).
    pub cause: Option<Arc<EvalError>>,
}

impl ErrorValue {
    /// Construct an `ErrorValue` from a taxonomy entry with no further cause.
    pub fn new(kind: EvalError) -> Self {
        Self { message: kind.to_string(), kind, cause: None }
    }

    /// Construct an `ErrorValue` recording `cause` as the trigger for `kind`.
    pub fn with_cause(kind: EvalError, cause: EvalError) -> Self {
        Self { message: kind.to_string(), kind, cause: Some(Arc::new(cause)) }
    }
}

/// A tagged JSON-like value, extended with `Undefined` (absence) and
/// `Error` (evaluation failure) per spec §3/§4.1.
#[derive(Debug, Clone)]
pub enum Value {
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// Arbitrary-precision decimal number (integers and decimals unified).
    Num(Decimal),
    /// JSON string.
    Text(String),
    /// JSON array; equality is strict and positional.
    Array(Vec<Value>),
    /// JSON object with unique keys; iteration order is insertion order,
    /// equality is order-insensitive.
    Object(IndexMap<String, Value>),
    /// Absence — a missing key, an unbound optional subscription field, etc.
    Undefined,
    /// An evaluation failure. Poisons any composite operator it enters.
    Error(ErrorValue),
}

impl Default for Value {
    /// `Value::Undefined`: the default reading of an absent field.
    fn default() -> Self {
        Value::Undefined
    }
}

impl Value {
    /// Construct an `Error` value from a taxonomy entry.
    pub fn error(kind: EvalError) -> Self {
        Value::Error(ErrorValue::new(kind))
    }

    /// Construct a `Num` value from an `i64`.
    pub fn int(n: i64) -> Self {
        Value::Num(Decimal::from(n))
    }

    /// Construct a `Text` value.
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// True if this value is `Value::Error`.
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// True if this value is `Value::Undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// The XACML-ish "truthy" reading used by `&&`/`||`/`!`/where-statements:
    /// only an actual `Bool` is truthy or falsy; everything else is an error
    /// at the call site (callers should match on `Value::Bool` directly and
    /// treat anything else, including this function's `None`, as `Error`).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value's kind name, for type-mismatch error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Num(_) => "number",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Undefined => "undefined",
            Value::Error(_) => "error",
        }
    }

    /// Convert a wire JSON value into a `Value`. Total: every
    /// `serde_json::Value` has a `Value` representation (`Undefined` and
    /// `Error` never arise from this conversion).
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                let dec = Decimal::from_str(&n.to_string())
                    .ok()
                    .or_else(|| n.as_f64().and_then(Decimal::from_f64_retain))
                    .unwrap_or_default();
                Value::Num(dec)
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(a) => Value::Array(a.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(o) => {
                Value::Object(o.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect())
            }
        }
    }

    /// Convert to canonical wire JSON. Returns `None` for `Undefined` and
    /// `Error`, which have no JSON representation (callers decide whether
    /// that means "omit the field" or "this is a bug").
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Value::Null => Some(serde_json::Value::Null),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::Num(n) => serde_json::Number::from_str(&n.normalize().to_string())
                .ok()
                .map(serde_json::Value::Number),
            Value::Text(s) => Some(serde_json::Value::String(s.clone())),
            Value::Array(a) => {
                a.iter().map(Value::to_json).collect::<Option<Vec<_>>>().map(serde_json::Value::Array)
            }
            Value::Object(o) => {
                let mut m = serde_json::Map::new();
                for (k, v) in o {
                    m.insert(k.clone(), v.to_json()?);
                }
                Some(serde_json::Value::Object(m))
            }
            Value::Undefined | Value::Error(_) => None,
        }
    }
}

/// Deep equality per spec §4.1: `Error` never compares equal to anything
/// (including another `Error`); arrays are strict/positional; objects are
/// order-insensitive and ignore `Undefined`-valued keys on both sides.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Error(_), _) | (_, Value::Error(_)) => false,
            (Value::Null, Value::Null) => true,
            (Value::Undefined, Value::Undefined) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => objects_eq(a, b),
            _ => false,
        }
    }
}

fn objects_eq(a: &IndexMap<String, Value>, b: &IndexMap<String, Value>) -> bool {
    let defined = |m: &IndexMap<String, Value>| -> Vec<(&String, &Value)> {
        m.iter().filter(|(_, v)| !v.is_undefined()).collect()
    };
    let da = defined(a);
    let db = defined(b);
    if da.len() != db.len() {
        return false;
    }
    da.iter().all(|(k, v)| b.get(*k).is_some_and(|v2| v2 == *v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: &[(&str, Value)]) -> Value {
        Value::Object(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn reflexive_for_non_error_values() {
        assert_eq!(Value::Null, Value::Null);
        assert_eq!(Value::Undefined, Value::Undefined);
        assert_eq!(Value::Bool(true), Value::Bool(true));
        assert_eq!(Value::int(1), Value::int(1));
        assert_eq!(Value::text("a"), Value::text("a"));
    }

    #[test]
    fn error_never_equal() {
        let e1 = Value::error(EvalError::Timeout);
        let e2 = Value::error(EvalError::Timeout);
        assert_ne!(e1, e2);
        assert_ne!(e1, Value::Null);
    }

    #[test]
    fn object_equality_is_order_insensitive() {
        let a = obj(&[("a", Value::int(1)), ("b", Value::int(2))]);
        let b = obj(&[("b", Value::int(2)), ("a", Value::int(1))]);
        assert_eq!(a, b);
    }

    #[test]
    fn object_equality_ignores_undefined_keys() {
        let a = obj(&[("a", Value::int(1)), ("b", Value::Undefined)]);
        let b = obj(&[("a", Value::int(1))]);
        assert_eq!(a, b);
    }

    #[test]
    fn array_equality_is_positional() {
        let a = Value::Array(vec![Value::int(1), Value::int(2)]);
        let b = Value::Array(vec![Value::int(2), Value::int(1)]);
        assert_ne!(a, b);
    }

    #[test]
    fn json_round_trip() {
        let json = serde_json::json!({"a": 1, "b": [true, null, "x"]});
        let v = Value::from_json(&json);
        assert_eq!(v.to_json().unwrap(), json);
    }
}
