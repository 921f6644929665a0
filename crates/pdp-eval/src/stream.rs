//! The streaming evaluator (spec §4.4: "the current expression re-evaluates
//! each time the station emits"). Reached only for expressions containing
//! at least one `AttributeFinder` subtree (classification `Stream`); pure
//! subtrees are folded to a single-item stream at the leaves.

use crate::ast::{AttributeOpts, Expr, FilterSpec};
use crate::context::EvalContext;
use crate::{eval, operators};
use futures::stream::{self, BoxStream, StreamExt};
use pdp_attributes::{AttributeBroker, AttributeKey, AttributeRequest};
use pdp_core::{AttributeTiming, EvalError, Value};
use std::sync::Arc;
use std::time::Duration;

/// Evaluate `expr` once, taking the first value it produces whether or not
/// it references an attribute finder (the async filter-application path
/// uses this for selector/action sub-expressions, spec §4.5, since a
/// selector step or call argument may itself invoke a finder).
pub async fn eval_once(expr: &Expr, ctx: &EvalContext) -> Value {
    evaluate_stream(expr, ctx).next().await.unwrap_or(Value::Undefined)
}

/// Evaluate `expr` against `ctx` as a lazy sequence: one item per distinct
/// combination of the attribute subscriptions it depends on emitting a new
/// value (spec §4.4). For an expression with no attribute reference this
/// degenerates to a single-item stream of the pure result.
pub fn evaluate_stream(expr: &Expr, ctx: &EvalContext) -> BoxStream<'static, Value> {
    if !expr.references_attribute_finder() {
        let value = eval::evaluate(expr, ctx);
        return stream::once(async move { value }).boxed();
    }

    match expr {
        Expr::AttributeFinder { entity, name, args, opts } => attribute_finder_stream(entity, name, args, opts, ctx),
        Expr::Array(items) => {
            let sources: Vec<_> = items.iter().map(|e| evaluate_stream(e, ctx)).collect();
            combine_latest(sources, Arc::new(|values: &[Value]| Value::Array(values.to_vec())))
        }
        Expr::Object(fields) => {
            let keys: Vec<String> = fields.iter().map(|(k, _)| k.clone()).collect();
            let sources: Vec<_> = fields.iter().map(|(_, e)| evaluate_stream(e, ctx)).collect();
            combine_latest(
                sources,
                Arc::new(move |values: &[Value]| {
                    Value::Object(keys.iter().cloned().zip(values.iter().cloned()).collect())
                }),
            )
        }
        Expr::BinArith { op, lhs, rhs } => {
            let op = *op;
            binary_stream(lhs, rhs, ctx, move |a, b| operators::arith(op, a, b))
        }
        Expr::BinBool { op, lhs, rhs } => {
            let op = *op;
            binary_stream(lhs, rhs, ctx, move |a, b| operators::bool_op(op, a, b))
        }
        Expr::BinRel { op, lhs, rhs } => {
            let op = *op;
            binary_stream(lhs, rhs, ctx, move |a, b| operators::relational(op, a, b))
        }
        Expr::Regex { text, pattern } => binary_stream(text, pattern, ctx, operators::regex_match),
        Expr::Neg(e) => evaluate_stream(e, ctx).map(operators::neg).boxed(),
        Expr::Not(e) => evaluate_stream(e, ctx).map(operators::not).boxed(),
        Expr::Path { base, steps } => {
            let steps = steps.clone();
            let ctx = ctx.clone();
            evaluate_stream(base, &ctx)
                .map(move |base| crate::path::navigate(base, &steps, &ctx, &eval::evaluate))
                .boxed()
        }
        Expr::Call { name, args } => {
            let name = name.clone();
            let ctx = ctx.clone();
            let sources: Vec<_> = args.iter().map(|a| evaluate_stream(a, &ctx)).collect();
            combine_latest(sources, Arc::new(move |values: &[Value]| ctx.functions.call(&name, values)))
        }
        Expr::Transform { base, spec } => {
            let streaming = crate::ast::filter_spec_references_attribute_finder(spec);
            let spec = spec.clone();
            let ctx = ctx.clone();
            if streaming {
                evaluate_stream(base, &ctx)
                    .then(move |base| {
                        let spec = spec.clone();
                        let ctx = ctx.clone();
                        async move { crate::filter::apply_transform_async(base, &spec, &ctx).await }
                    })
                    .boxed()
            } else {
                evaluate_stream(base, &ctx)
                    .map(move |base| crate::filter::apply_transform(base, &spec, &ctx, &eval::evaluate))
                    .boxed()
            }
        }
        Expr::Subtemplate { base, template } => {
            // The base's own attribute references re-evaluate the whole
            // mapped array; per-element template streaming is out of
            // scope (spec leaves subtemplate+attribute interaction
            // unspecified) — each emission maps the template purely.
            let template = template.clone();
            let ctx = ctx.clone();
            evaluate_stream(base, &ctx)
                .map(move |base| {
                    let expr = Expr::Subtemplate { base: Box::new(value_literal(base)), template: template.clone() };
                    eval::evaluate(&expr, &ctx)
                })
                .boxed()
        }
        Expr::VarDef { name, value, body } => {
            let name = name.clone();
            let body = body.clone();
            let ctx = ctx.clone();
            evaluate_stream(value, &ctx)
                .map(move |v| {
                    let child = ctx.with_binding(name.clone(), v);
                    eval::evaluate(&body, &child)
                })
                .boxed()
        }
        Expr::WhereBody(statements) => {
            let sources: Vec<_> = statements.iter().map(|s| evaluate_stream(s, ctx)).collect();
            combine_latest(
                sources,
                Arc::new(|values: &[Value]| {
                    for v in values {
                        match v {
                            Value::Bool(true) => continue,
                            Value::Bool(false) => return Value::Bool(false),
                            e if e.is_error() => return e.clone(),
                            other => {
                                return Value::error(EvalError::TypeMismatch(format!(
                                    "where-body statement must be boolean, got {}",
                                    other.type_name()
                                )))
                            }
                        }
                    }
                    Value::Bool(true)
                }),
            )
        }
        // Leaves and target-forbidden constructs never reach here because
        // `references_attribute_finder` would have been false.
        _ => {
            let value = eval::evaluate(expr, ctx);
            stream::once(async move { value }).boxed()
        }
    }
}

/// Wrap an already-evaluated `Value` back into a literal-ish `Expr` node
/// for re-entry into the pure evaluator (used only by the subtemplate
/// base re-evaluation above, where the base is a array/object/scalar).
fn value_literal(v: Value) -> Expr {
    match v {
        Value::Null => Expr::Null,
        Value::Bool(b) => Expr::Bool(b),
        Value::Num(n) => Expr::Num(n),
        Value::Text(s) => Expr::Text(s),
        Value::Array(items) => Expr::Array(items.into_iter().map(value_literal).collect()),
        Value::Object(o) => Expr::Object(o.into_iter().map(|(k, v)| (k, value_literal(v))).collect()),
        Value::Undefined | Value::Error(_) => Expr::Null,
    }
}

fn binary_stream(
    lhs: &Expr,
    rhs: &Expr,
    ctx: &EvalContext,
    f: impl Fn(Value, Value) -> Value + Send + Sync + 'static,
) -> BoxStream<'static, Value> {
    let sources = vec![evaluate_stream(lhs, ctx), evaluate_stream(rhs, ctx)];
    combine_latest(sources, Arc::new(move |values: &[Value]| f(values[0].clone(), values[1].clone())))
}

/// Merge `sources` into one stream that re-emits `combine(&snapshot)`
/// every time any source produces a new value, once every source has
/// produced at least one (a reactive "combine latest").
fn combine_latest(
    sources: Vec<BoxStream<'static, Value>>,
    combine: Arc<dyn Fn(&[Value]) -> Value + Send + Sync>,
) -> BoxStream<'static, Value> {
    let n = sources.len();
    if n == 0 {
        let value = combine(&[]);
        return stream::once(async move { value }).boxed();
    }
    let tagged = sources.into_iter().enumerate().map(|(i, s)| s.map(move |v| (i, v)).boxed());
    let merged = stream::select_all(tagged);
    let snapshot: Vec<Option<Value>> = vec![None; n];

    stream::unfold((merged, snapshot, combine), |(mut merged, mut snapshot, combine)| async move {
        loop {
            let (idx, value) = merged.next().await?;
            snapshot[idx] = Some(value);
            if snapshot.iter().all(Option::is_some) {
                let values: Vec<Value> = snapshot.iter().map(|v| v.clone().unwrap()).collect();
                let out = combine(&values);
                return Some((out, (merged, snapshot, combine)));
            }
        }
    })
    .boxed()
}

fn attribute_finder_stream(
    entity: &Option<Box<Expr>>,
    name: &str,
    args: &[Expr],
    opts: &AttributeOpts,
    ctx: &EvalContext,
) -> BoxStream<'static, Value> {
    let entity_value = entity.as_ref().map(|e| eval::evaluate(e, ctx));
    let arg_values: Vec<Value> = args.iter().map(|a| eval::evaluate(a, ctx)).collect();

    match build_attribute_request(entity_value, name, arg_values, opts, ctx) {
        Ok((attributes, request)) => attributes.subscribe(request).boxed(),
        Err(value) => stream::once(async move { value }).boxed(),
    }
}

/// One-shot counterpart of [`attribute_finder_stream`]: subscribes and
/// takes the first value, for an attribute-finder reference reached from
/// the async filter-application path (spec §8 scenario 5's `@.<echo>`)
/// rather than from `Expr::AttributeFinder` directly. The site re-fetches
/// whenever its own base stream re-emits, so a single value per call is
/// sufficient here.
pub async fn fetch_attribute_once(
    entity_value: Option<Value>,
    name: &str,
    arg_values: Vec<Value>,
    opts: &AttributeOpts,
    ctx: &EvalContext,
) -> Value {
    match build_attribute_request(entity_value, name, arg_values, opts, ctx) {
        Ok((attributes, request)) => {
            let mut rx = attributes.subscribe(request);
            rx.next().await.unwrap_or(Value::Undefined)
        }
        Err(value) => value,
    }
}

/// Validate an attribute-finder invocation's already-evaluated entity/args
/// and assemble the broker request for it, or the error `Value` it should
/// produce instead (spec §4.3's unbound-finder/no-broker cases).
fn build_attribute_request(
    entity_value: Option<Value>,
    name: &str,
    arg_values: Vec<Value>,
    opts: &AttributeOpts,
    ctx: &EvalContext,
) -> Result<(Arc<AttributeBroker>, AttributeRequest), Value> {
    if let Some(e) = &entity_value {
        if e.is_error() {
            return Err(e.clone());
        }
    }
    if let Some(err) = arg_values.iter().find(|v| v.is_error()) {
        return Err(err.clone());
    }

    let Some(attributes) = ctx.attributes.clone() else {
        return Err(Value::error(EvalError::AttributeUpstream("no attribute broker configured".into())));
    };

    let timing = resolve_timing(opts, ctx);
    let fresh = opts.fresh.as_ref().map(|e| matches!(eval::evaluate(e, ctx), Value::Bool(true))).unwrap_or(false);
    let linger = opts.linger.as_ref().map(|e| duration_from(eval::evaluate(e, ctx)));
    let variables = ctx.scope.snapshot();

    let key = AttributeKey::new(
        ctx.config.pdp_configuration_id.clone(),
        name.to_string(),
        entity_value.as_ref(),
        &arg_values,
        &variables,
    );

    // Spec §4.3: "Attribute-finder registration mirrors §4.2: entities are
    // looked up by fully qualified name." An unregistered name is an
    // ordinary unbound-reference error, the same outcome an unbound
    // function call produces.
    let finder = match ctx.attribute_finders.as_deref() {
        Some(registry) => registry.resolve(name).map_err(Value::error)?,
        None => return Err(Value::error(EvalError::UnboundReference(name.to_string()))),
    };

    let request = AttributeRequest {
        key,
        finder,
        entity: entity_value.unwrap_or(Value::Undefined),
        args: arg_values,
        variables,
        timing,
        fresh,
        linger,
    };
    Ok((attributes, request))
}

fn resolve_timing(opts: &AttributeOpts, ctx: &EvalContext) -> AttributeTiming {
    let default = ctx.config.default_timing;
    AttributeTiming {
        initial_timeout: opts
            .initial_timeout
            .as_ref()
            .map(|e| duration_from(eval::evaluate(e, ctx)))
            .unwrap_or(default.initial_timeout),
        poll_interval: opts
            .poll_interval
            .as_ref()
            .map(|e| duration_from(eval::evaluate(e, ctx)))
            .unwrap_or(default.poll_interval),
        backoff: opts.backoff.as_ref().map(|e| duration_from(eval::evaluate(e, ctx))).unwrap_or(default.backoff),
        retries: opts
            .retries
            .as_ref()
            .map(|e| match eval::evaluate(e, ctx) {
                Value::Num(n) => n.trunc().to_string().parse().unwrap_or(default.retries),
                _ => default.retries,
            })
            .unwrap_or(default.retries),
    }
}

fn duration_from(v: Value) -> Duration {
    match v {
        Value::Num(n) => {
            let millis: u64 = n.trunc().to_string().parse().unwrap_or(0);
            Duration::from_millis(millis)
        }
        _ => Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn immediate(v: Value) -> BoxStream<'static, Value> {
        stream::once(async move { v }).boxed()
    }

    fn delayed(v: Value, millis: u64) -> BoxStream<'static, Value> {
        stream::once(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            v
        })
        .boxed()
    }

    fn array_combine() -> Arc<dyn Fn(&[Value]) -> Value + Send + Sync> {
        Arc::new(|values: &[Value]| Value::Array(values.to_vec()))
    }

    #[tokio::test]
    async fn combine_latest_waits_for_every_source_before_first_emit() {
        // Source 0 is the slow one; combine_latest must not emit until
        // both have produced at least one value.
        let sources = vec![delayed(Value::int(1), 30), immediate(Value::int(2))];
        let mut out = combine_latest(sources, array_combine());
        let first = out.next().await.unwrap();
        assert_eq!(first, Value::Array(vec![Value::int(1), Value::int(2)]));
        assert!(out.next().await.is_none());
    }

    #[tokio::test]
    async fn combine_latest_preserves_source_order_regardless_of_arrival_order() {
        // Source 1 resolves first here (source 0 is the slow one), but the
        // combined snapshot must still place values by source index.
        let sources = vec![delayed(Value::int(10), 30), immediate(Value::int(20))];
        let out = combine_latest(sources, array_combine()).next().await.unwrap();
        assert_eq!(out, Value::Array(vec![Value::int(10), Value::int(20)]));
    }

    #[tokio::test]
    async fn combine_latest_folds_more_than_two_sources() {
        let sources = vec![immediate(Value::int(1)), immediate(Value::int(2)), immediate(Value::int(3))];
        let sum = Arc::new(|values: &[Value]| {
            let total: i64 = values
                .iter()
                .map(|v| match v {
                    Value::Num(n) => n.to_string().parse::<i64>().unwrap_or(0),
                    _ => 0,
                })
                .sum();
            Value::int(total)
        });
        let out = combine_latest(sources, sum).next().await.unwrap();
        assert_eq!(out, Value::int(6));
    }

    #[tokio::test]
    async fn combine_latest_zero_sources_emits_combine_of_empty_slice() {
        let out = combine_latest(vec![], Arc::new(|_: &[Value]| Value::Bool(true))).next().await.unwrap();
        assert_eq!(out, Value::Bool(true));
    }

    /// Mirrors `evaluate_stream`'s `Expr::WhereBody` combine: scan statement
    /// results in declared order, returning the first `false` or error.
    fn where_body_combine(values: &[Value]) -> Value {
        for v in values {
            match v {
                Value::Bool(true) => continue,
                Value::Bool(false) => return Value::Bool(false),
                e if e.is_error() => return e.clone(),
                _ => return Value::error(EvalError::TypeMismatch("not boolean".into())),
            }
        }
        Value::Bool(true)
    }

    #[tokio::test]
    async fn where_body_false_beats_a_slower_error_producing_statement() {
        // Statement 0 (false) resolves slower than statement 1 (error), but
        // the combine function must still prefer statement 0's position —
        // arrival order never overrides declared order.
        let sources = vec![
            delayed(Value::Bool(false), 30),
            immediate(Value::error(EvalError::AttributeUpstream("boom".into()))),
        ];
        let out = combine_latest(sources, Arc::new(where_body_combine)).next().await.unwrap();
        assert_eq!(out, Value::Bool(false));
    }

    #[tokio::test]
    async fn where_body_error_wins_when_it_is_the_earlier_statement() {
        let sources = vec![
            immediate(Value::error(EvalError::AttributeUpstream("boom".into()))),
            delayed(Value::Bool(false), 30),
        ];
        let out = combine_latest(sources, Arc::new(where_body_combine)).next().await.unwrap();
        assert!(out.is_error());
    }

    #[tokio::test]
    async fn binary_stream_combines_two_sources_with_the_given_function() {
        let lhs = Expr::Num(rust_decimal::Decimal::from(2));
        let rhs = Expr::Num(rust_decimal::Decimal::from(3));
        let ctx = test_ctx();
        let out = binary_stream(&lhs, &rhs, &ctx, |a, b| operators::arith(ArithOp::Add, a, b)).next().await.unwrap();
        assert_eq!(out, Value::int(5));
    }

    use crate::ast::ArithOp;
    use crate::context::{EvalMode, FunctionContext};
    use pdp_core::{PdpConfig, Subscription};
    use pdp_functions::{FunctionRegistry, ImportTable};

    fn test_ctx() -> EvalContext {
        let functions =
            FunctionContext { registry: Arc::new(FunctionRegistry::new()), imports: Arc::new(ImportTable::build(&[])) };
        EvalContext::new(Arc::new(Subscription::default()), functions, None, None, Arc::new(PdpConfig::default()), EvalMode::Normal)
    }
}
