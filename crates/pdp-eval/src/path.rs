//! Path navigation (spec §4.4): key/index/slice/wildcard/recursive-descent/
//! unions/expression/condition steps over a base `Value`.

use crate::ast::{Expr, PathStep};
use crate::context::EvalContext;
use pdp_core::{EvalError, Value};

/// A sub-expression evaluator path navigation calls back into for
/// `ExprStep`/`ConditionStep` (avoids a circular module dependency between
/// `path` and the top-level evaluator).
pub type SubEval<'a> = dyn Fn(&Expr, &EvalContext) -> Value + 'a;

/// Walk `steps` over `base` in order, threading `ctx` through any step
/// that must evaluate a sub-expression.
pub fn navigate(mut base: Value, steps: &[PathStep], ctx: &EvalContext, eval: &SubEval) -> Value {
    for step in steps {
        if base.is_error() {
            return base;
        }
        base = apply_step(base, step, ctx, eval);
    }
    base
}

fn normalize_index(i: i64, len: usize) -> Option<usize> {
    if i >= 0 {
        let i = i as usize;
        (i < len).then_some(i)
    } else {
        let from_end = (-i) as usize;
        (from_end <= len).then(|| len - from_end)
    }
}

fn apply_step(base: Value, step: &PathStep, ctx: &EvalContext, eval: &SubEval) -> Value {
    match step {
        PathStep::Key(name) => key_step(&base, name),
        PathStep::Index(i) => index_step(base, *i),
        PathStep::Slice { start, end, step } => slice_step(base, *start, *end, *step),
        PathStep::Wildcard => wildcard_step(base),
        PathStep::RecursiveKey(name) => {
            let mut out = Vec::new();
            recursive_collect_key(&base, name, &mut out);
            Value::Array(out)
        }
        PathStep::RecursiveIndex(i) => {
            let mut out = Vec::new();
            recursive_collect_index(&base, *i, &mut out);
            Value::Array(out)
        }
        PathStep::RecursiveWildcard => {
            let mut out = Vec::new();
            recursive_collect_all(&base, &mut out);
            Value::Array(out)
        }
        PathStep::IndexUnion(indices) => index_union_step(base, indices),
        PathStep::KeyUnion(keys) => key_union_step(base, keys),
        PathStep::ExprStep(expr) => expr_step(base, expr, ctx, eval),
        PathStep::ConditionStep(expr) => condition_step(base, expr, ctx, eval),
        // A selector referencing a finder makes the whole path classify as
        // `Stream` (spec §4.4), so the streaming evaluator's async filter
        // path handles it instead; this synchronous navigator never reaches
        // it for a well-formed, correctly-classified expression.
        PathStep::AttributeFinder { .. } => Value::error(EvalError::AttributeInTarget),
    }
}

fn key_step(base: &Value, name: &str) -> Value {
    match base {
        Value::Object(o) => o.get(name).cloned().unwrap_or(Value::Undefined),
        Value::Undefined => Value::Undefined,
        e if e.is_error() => e.clone(),
        _ => Value::Undefined,
    }
}

fn index_step(base: Value, i: i64) -> Value {
    match base {
        Value::Array(items) => match normalize_index(i, items.len()) {
            Some(idx) => items[idx].clone(),
            None => Value::error(EvalError::IndexOutOfBounds(format!("index {i} out of bounds"))),
        },
        e if e.is_error() => e,
        other => Value::error(EvalError::NonArrayIndex(format!(
            "index step expects an array, got {}",
            other.type_name()
        ))),
    }
}

fn slice_step(base: Value, start: Option<i64>, end: Option<i64>, step: i64) -> Value {
    match base {
        Value::Array(items) => {
            let len = items.len() as i64;
            let start = start.unwrap_or(0);
            let end = end.unwrap_or(len);
            let clamp = |v: i64| -> usize {
                let v = if v < 0 { (len + v).max(0) } else { v.min(len) };
                v as usize
            };
            let (s, e) = (clamp(start), clamp(end));
            let step = if step == 0 { 1 } else { step };
            if s >= e || step <= 0 {
                return Value::Array(Vec::new());
            }
            let sliced = items[s..e].iter().step_by(step as usize).cloned().collect();
            Value::Array(sliced)
        }
        e if e.is_error() => e,
        other => Value::error(EvalError::NonArrayIndex(format!(
            "slice step expects an array, got {}",
            other.type_name()
        ))),
    }
}

fn wildcard_step(base: Value) -> Value {
    match base {
        Value::Array(items) => Value::Array(items),
        Value::Object(o) => Value::Array(o.into_values().collect()),
        e if e.is_error() => e,
        other => Value::error(EvalError::TypeMismatch(format!(
            "wildcard step expects an array or object, got {}",
            other.type_name()
        ))),
    }
}

fn recursive_collect_key(v: &Value, name: &str, out: &mut Vec<Value>) {
    match v {
        Value::Object(o) => {
            if let Some(found) = o.get(name) {
                out.push(found.clone());
            }
            for value in o.values() {
                recursive_collect_key(value, name, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                recursive_collect_key(item, name, out);
            }
        }
        _ => {}
    }
}

fn recursive_collect_index(v: &Value, i: i64, out: &mut Vec<Value>) {
    match v {
        Value::Array(items) => {
            if let Some(idx) = normalize_index(i, items.len()) {
                out.push(items[idx].clone());
            }
            for item in items {
                recursive_collect_index(item, i, out);
            }
        }
        Value::Object(o) => {
            for value in o.values() {
                recursive_collect_index(value, i, out);
            }
        }
        _ => {}
    }
}

fn recursive_collect_all(v: &Value, out: &mut Vec<Value>) {
    match v {
        Value::Object(o) => {
            for value in o.values() {
                out.push(value.clone());
                recursive_collect_all(value, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                out.push(item.clone());
                recursive_collect_all(item, out);
            }
        }
        _ => {}
    }
}

fn index_union_step(base: Value, indices: &[i64]) -> Value {
    match base {
        Value::Array(items) => Value::Array(
            indices
                .iter()
                .map(|&i| match normalize_index(i, items.len()) {
                    Some(idx) => items[idx].clone(),
                    None => Value::error(EvalError::IndexOutOfBounds(format!("index {i} out of bounds"))),
                })
                .collect(),
        ),
        e if e.is_error() => e,
        other => Value::error(EvalError::NonArrayIndex(format!(
            "index union expects an array, got {}",
            other.type_name()
        ))),
    }
}

fn key_union_step(base: Value, keys: &[String]) -> Value {
    match base {
        Value::Object(o) => {
            Value::Array(keys.iter().map(|k| o.get(k).cloned().unwrap_or(Value::Undefined)).collect())
        }
        e if e.is_error() => e,
        other => Value::error(EvalError::NonObjectKeyUnion(format!(
            "key union expects an object, got {}",
            other.type_name()
        ))),
    }
}

fn expr_step(base: Value, expr: &Expr, ctx: &EvalContext, eval: &SubEval) -> Value {
    let index_or_key = eval(expr, ctx);
    match index_or_key {
        Value::Num(n) => {
            let i: i64 = n.trunc().to_string().parse().unwrap_or(0);
            index_step(base, i)
        }
        Value::Text(k) => key_step(&base, &k),
        e if e.is_error() => e,
        other => Value::error(EvalError::TypeMismatch(format!(
            "expr step expects a number or text, got {}",
            other.type_name()
        ))),
    }
}

fn condition_step(base: Value, expr: &Expr, ctx: &EvalContext, eval: &SubEval) -> Value {
    let elements: Vec<Value> = match base {
        Value::Array(items) => items,
        Value::Object(o) => o.into_values().collect(),
        e if e.is_error() => return e,
        other => {
            return Value::error(EvalError::TypeMismatch(format!(
                "condition step expects an array or object, got {}",
                other.type_name()
            )))
        }
    };
    let mut out = Vec::new();
    for element in elements {
        let element_ctx = ctx.with_relative(element.clone());
        match eval(expr, &element_ctx) {
            Value::Bool(true) => out.push(element),
            Value::Bool(false) => {}
            _ => {} // Undefined/Error elements are skipped (spec §4.4).
        }
    }
    Value::Array(out)
}
