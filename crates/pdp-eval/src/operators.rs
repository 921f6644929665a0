//! Arithmetic/boolean/relational/regex/negation operators (spec §4.4).

use crate::ast::{ArithOp, BoolOp, RelOp};
use pdp_core::{EvalError, Value};
use regex::Regex;

/// Error-propagation helper: if either operand is `Error`, return it
/// (spec §4.1: "Error operands short-circuit any operator to Error whose
/// message is the first operand's message").
fn propagate_error(a: &Value, b: &Value) -> Option<Value> {
    if a.is_error() {
        return Some(a.clone());
    }
    if b.is_error() {
        return Some(b.clone());
    }
    None
}

/// `+ - * /`, with `+` doubling as text concatenation.
pub fn arith(op: ArithOp, a: Value, b: Value) -> Value {
    if let Some(e) = propagate_error(&a, &b) {
        return e;
    }
    match (op, a, b) {
        (ArithOp::Add, Value::Text(x), Value::Text(y)) => Value::Text(x + &y),
        (op, Value::Num(x), Value::Num(y)) => match op {
            ArithOp::Add => Value::Num(x + y),
            ArithOp::Sub => Value::Num(x - y),
            ArithOp::Mul => Value::Num(x * y),
            ArithOp::Div => {
                if y.is_zero() {
                    Value::error(EvalError::Other("division by zero".into()))
                } else {
                    Value::Num(x / y)
                }
            }
        },
        (_, a, b) => Value::error(EvalError::TypeMismatch(format!(
            "arithmetic operand types {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

/// Unary `-` on numbers.
pub fn neg(v: Value) -> Value {
    match v {
        Value::Num(n) => Value::Num(-n),
        e if e.is_error() => e,
        other => Value::error(EvalError::TypeMismatch(format!("negation expects a number, got {}", other.type_name()))),
    }
}

/// Unary `!` on booleans.
pub fn not(v: Value) -> Value {
    match v {
        Value::Bool(b) => Value::Bool(!b),
        e if e.is_error() => e,
        other => {
            Value::error(EvalError::TypeMismatch(format!("`!` expects a boolean, got {}", other.type_name())))
        }
    }
}

/// Short-circuiting `&&`/`||`. `lhs` is already evaluated by the caller;
/// `eval_rhs` is only invoked when short-circuiting doesn't apply, so the
/// caller can thread lazy (possibly streaming) evaluation through.
pub fn bool_op_short_circuits(op: BoolOp, lhs: &Value) -> Option<Value> {
    match (op, lhs) {
        (BoolOp::And, Value::Bool(false)) => Some(Value::Bool(false)),
        (BoolOp::Or, Value::Bool(true)) => Some(Value::Bool(true)),
        (_, e) if e.is_error() => Some(e.clone()),
        _ => None,
    }
}

/// Finish a non-short-circuited `&&`/`||` once both operands are known.
pub fn bool_op(op: BoolOp, a: Value, b: Value) -> Value {
    if let Some(e) = propagate_error(&a, &b) {
        return e;
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Value::Bool(match op {
            BoolOp::And => x && y,
            BoolOp::Or => x || y,
        }),
        (a, b) => Value::error(EvalError::TypeMismatch(format!(
            "boolean operand types {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

/// `< <= > >= == !=`.
pub fn relational(op: RelOp, a: Value, b: Value) -> Value {
    if let Some(e) = propagate_error(&a, &b) {
        return e;
    }
    match op {
        RelOp::Eq => return Value::Bool(a == b),
        RelOp::Ne => return Value::Bool(a != b),
        _ => {}
    }
    let ordering = match (&a, &b) {
        (Value::Num(x), Value::Num(y)) => x.partial_cmp(y),
        (Value::Text(x), Value::Text(y)) => x.partial_cmp(y),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return Value::error(EvalError::TypeMismatch(format!(
            "ordering comparison between {} and {}",
            a.type_name(),
            b.type_name()
        )));
    };
    let result = match op {
        RelOp::Lt => ordering.is_lt(),
        RelOp::Le => ordering.is_le(),
        RelOp::Gt => ordering.is_gt(),
        RelOp::Ge => ordering.is_ge(),
        RelOp::Eq | RelOp::Ne => unreachable!("handled above"),
    };
    Value::Bool(result)
}

/// `lhs =~ rhs`: `lhs` is matched as text against `rhs`, a text pattern.
pub fn regex_match(text: Value, pattern: Value) -> Value {
    if let Some(e) = propagate_error(&text, &pattern) {
        return e;
    }
    match (text, pattern) {
        (Value::Text(t), Value::Text(p)) => match Regex::new(&p) {
            Ok(re) => Value::Bool(re.is_match(&t)),
            Err(err) => Value::error(EvalError::InvalidRegex(err.to_string())),
        },
        (t, p) => Value::error(EvalError::TypeMismatch(format!(
            "=~ expects (text, text), got ({}, {})",
            t.type_name(),
            p.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_plus_text_concatenates() {
        assert_eq!(arith(ArithOp::Add, Value::text("a"), Value::text("b")), Value::text("ab"));
    }

    #[test]
    fn num_div_zero_is_error() {
        assert!(arith(ArithOp::Div, Value::int(1), Value::int(0)).is_error());
    }

    #[test]
    fn relational_on_mismatched_types_is_error() {
        assert!(relational(RelOp::Lt, Value::int(1), Value::text("a")).is_error());
    }

    #[test]
    fn equality_operators_use_value_equality() {
        assert_eq!(relational(RelOp::Eq, Value::int(1), Value::int(1)), Value::Bool(true));
        assert_eq!(relational(RelOp::Ne, Value::int(1), Value::int(2)), Value::Bool(true));
    }

    #[test]
    fn regex_bad_pattern_is_error() {
        assert!(regex_match(Value::text("x"), Value::text("(")).is_error());
    }

    #[test]
    fn error_operand_propagates_first() {
        let e = Value::error(EvalError::Timeout);
        let result = arith(ArithOp::Add, e, Value::int(1));
        assert!(matches!(result, Value::Error(ref ev) if ev.kind == EvalError::Timeout));
    }
}
