//! The pure (non-streaming) evaluator: every `Expr` node except
//! `AttributeFinder` (spec §4.4). Callers only reach this evaluator for
//! expressions the policy compiler classified `Const` or `Pure` — it
//! still defends against a stray `AttributeFinder` by erroring rather
//! than panicking, since classification is conservative but not infallible.

use crate::ast::{BoolOp, Expr};
use crate::context::EvalContext;
use crate::{filter, operators, path};
use pdp_core::{EvalError, Value};

/// Evaluate `expr` against `ctx`, synchronously, to a single `Value`.
pub fn evaluate(expr: &Expr, ctx: &EvalContext) -> Value {
    match expr {
        Expr::Null => Value::Null,
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Num(n) => Value::Num(*n),
        Expr::Text(s) => Value::text(s.clone()),
        Expr::Array(items) => Value::Array(items.iter().map(|e| evaluate(e, ctx)).collect()),
        Expr::Object(fields) => {
            Value::Object(fields.iter().map(|(k, v)| (k.clone(), evaluate(v, ctx))).collect())
        }
        Expr::Var(name) => match ctx.resolve_var(name) {
            Some(v) => v,
            None => Value::error(EvalError::UnboundReference(name.clone())),
        },
        Expr::BinArith { op, lhs, rhs } => {
            operators::arith(*op, evaluate(lhs, ctx), evaluate(rhs, ctx))
        }
        Expr::BinBool { op, lhs, rhs } => {
            let l = evaluate(lhs, ctx);
            if let Some(short) = operators::bool_op_short_circuits(*op, &l) {
                return short;
            }
            operators::bool_op(*op, l, evaluate(rhs, ctx))
        }
        Expr::BinRel { op, lhs, rhs } => {
            operators::relational(*op, evaluate(lhs, ctx), evaluate(rhs, ctx))
        }
        Expr::Regex { text, pattern } => operators::regex_match(evaluate(text, ctx), evaluate(pattern, ctx)),
        Expr::Neg(e) => operators::neg(evaluate(e, ctx)),
        Expr::Not(e) => operators::not(evaluate(e, ctx)),
        Expr::Path { base, steps } => {
            let base = evaluate(base, ctx);
            path::navigate(base, steps, ctx, &evaluate)
        }
        Expr::Call { name, args } => {
            let values: Vec<Value> = args.iter().map(|a| evaluate(a, ctx)).collect();
            ctx.functions.call(name, &values)
        }
        Expr::AttributeFinder { .. } => Value::error(EvalError::AttributeInTarget),
        Expr::Transform { base, spec } => {
            let base = evaluate(base, ctx);
            filter::apply_transform(base, spec, ctx, &evaluate)
        }
        Expr::Subtemplate { base, template } => subtemplate(base, template, ctx),
        Expr::VarDef { name, value, body } => {
            if is_reserved(name) {
                return Value::error(EvalError::ReservedName(name.clone()));
            }
            let bound_value = evaluate(value, ctx);
            let child_ctx = ctx.with_binding(name.clone(), bound_value);
            evaluate(body, &child_ctx)
        }
        Expr::WhereBody(statements) => where_body(statements, ctx),
        Expr::RelativeContext => {
            ctx.relative.clone().unwrap_or_else(|| Value::error(EvalError::NoRelativeContext))
        }
    }
}

fn subtemplate(base: &Expr, template: &Expr, ctx: &EvalContext) -> Value {
    let base = evaluate(base, ctx);
    match base {
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|item| evaluate(template, &ctx.with_relative(item))).collect())
        }
        e if e.is_error() => e,
        other => Value::error(EvalError::TypeMismatch(format!(
            "subtemplate base must be an array, got {}",
            other.type_name()
        ))),
    }
}

fn where_body(statements: &[Expr], ctx: &EvalContext) -> Value {
    for statement in statements {
        match evaluate(statement, ctx) {
            Value::Bool(true) => continue,
            Value::Bool(false) => return Value::Bool(false),
            other if other.is_error() => return other,
            other => {
                return Value::error(EvalError::TypeMismatch(format!(
                    "where-body statement must be boolean, got {}",
                    other.type_name()
                )))
            }
        }
    }
    Value::Bool(true)
}

/// True if `name` shadows one of the four subscription fields — reserved
/// everywhere a variable name is declared (spec §3/§4.4), not just in `var`.
pub fn is_reserved(name: &str) -> bool {
    matches!(name, "subject" | "action" | "resource" | "environment")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ArithOp, RelOp};
    use crate::context::{EvalMode, FunctionContext};
    use pdp_core::{PdpConfig, Subscription};
    use pdp_functions::{FunctionRegistry, ImportTable};
    use std::sync::Arc;

    fn ctx() -> EvalContext {
        let functions =
            FunctionContext { registry: Arc::new(FunctionRegistry::new()), imports: Arc::new(ImportTable::build(&[])) };
        EvalContext::new(
            Arc::new(Subscription { subject: Value::text("alice"), ..Default::default() }),
            functions,
            None,
            None,
            Arc::new(PdpConfig::default()),
            EvalMode::Normal,
        )
    }

    #[test]
    fn var_resolves_to_subscription_field() {
        let out = evaluate(&Expr::Var("subject".into()), &ctx());
        assert_eq!(out, Value::text("alice"));
    }

    #[test]
    fn unbound_var_is_error() {
        let out = evaluate(&Expr::Var("nope".into()), &ctx());
        assert!(out.is_error());
    }

    #[test]
    fn where_body_short_circuits_on_false() {
        let stmts = vec![
            Expr::BinRel { op: RelOp::Eq, lhs: Box::new(Expr::Num(1.into())), rhs: Box::new(Expr::Num(2.into())) },
        ];
        assert_eq!(where_body(&stmts, &ctx()), Value::Bool(false));
    }

    #[test]
    fn where_body_non_boolean_is_error() {
        let stmts = vec![Expr::Num(1.into())];
        assert!(where_body(&stmts, &ctx()).is_error());
    }

    #[test]
    fn var_def_shadows_and_rejects_reserved_names() {
        let body = Expr::Var("x".into());
        let expr = Expr::VarDef { name: "x".into(), value: Box::new(Expr::Num(5.into())), body: Box::new(body) };
        assert_eq!(evaluate(&expr, &ctx()), Value::int(5));

        let reserved = Expr::VarDef {
            name: "subject".into(),
            value: Box::new(Expr::Num(5.into())),
            body: Box::new(Expr::Var("subject".into())),
        };
        assert!(evaluate(&reserved, &ctx()).is_error());
    }

    #[test]
    fn subtemplate_maps_over_array_with_relative_context() {
        let expr = Expr::Subtemplate {
            base: Box::new(Expr::Array(vec![Expr::Num(1.into()), Expr::Num(2.into())])),
            template: Box::new(Expr::BinArith {
                op: ArithOp::Add,
                lhs: Box::new(Expr::RelativeContext),
                rhs: Box::new(Expr::Num(10.into())),
            }),
        };
        assert_eq!(evaluate(&expr, &ctx()), Value::Array(vec![Value::int(11), Value::int(12)]));
    }

    #[test]
    fn relative_context_outside_any_scope_is_error() {
        assert!(evaluate(&Expr::RelativeContext, &ctx()).is_error());
    }
}
