//! Built-in function libraries (SPEC_FULL §4.2.1): registered through the
//! same plugin contract a third party would use, nothing privileged.

use crate::registry::{Function, Library};
use pdp_core::{EvalError, Value};

/// `simple.length`, `simple.identity`.
pub fn simple_library() -> Library {
    Library::new("simple")
        .with_function(Function::new("identity", 1, |a| a[0].clone()))
        .with_function(Function::new("length", 1, |a| match &a[0] {
            Value::Text(s) => Value::int(s.chars().count() as i64),
            Value::Array(v) => Value::int(v.len() as i64),
            Value::Object(o) => Value::int(o.len() as i64),
            other if other.is_error() => other.clone(),
            other => Value::error(EvalError::TypeMismatch(format!(
                "length expects text, array, or object, got {}",
                other.type_name()
            ))),
        }))
}

/// `standard.text.lower`, `standard.text.upper`, `standard.text.contains`.
pub fn standard_text_library() -> Library {
    Library::new("standard.text")
        .with_function(Function::new("lower", 1, |a| match &a[0] {
            Value::Text(s) => Value::text(s.to_lowercase()),
            other if other.is_error() => other.clone(),
            other => Value::error(EvalError::TypeMismatch(format!(
                "lower expects text, got {}",
                other.type_name()
            ))),
        }))
        .with_function(Function::new("upper", 1, |a| match &a[0] {
            Value::Text(s) => Value::text(s.to_uppercase()),
            other if other.is_error() => other.clone(),
            other => Value::error(EvalError::TypeMismatch(format!(
                "upper expects text, got {}",
                other.type_name()
            ))),
        }))
        .with_function(Function::new("contains", 2, |a| match (&a[0], &a[1]) {
            (Value::Text(hay), Value::Text(needle)) => Value::Bool(hay.contains(needle.as_str())),
            (e, _) | (_, e) if e.is_error() => e.clone(),
            _ => Value::error(EvalError::TypeMismatch("contains expects (text, text)".into())),
        }))
}

/// `filter.blacken` — the canonical redaction filter function referenced
/// by §4.5: replaces any value with a fixed-width marker, regardless of
/// its original shape or length.
pub fn filter_library() -> Library {
    Library::new("filter").with_function(Function::new("blacken", 1, |a| {
        if a[0].is_error() {
            return a[0].clone();
        }
        Value::text("\u{2588}\u{2588}\u{2588}\u{2588}\u{2588}\u{2588}\u{2588}\u{2588}")
    }))
}
