//! Filter & selection engine (C5, spec §4.5): computes target sites for a
//! selector, then applies the rule's action at each site in deterministic
//! bottom-up order so earlier mutations never shift later ones.

use crate::ast::{AttributeOpts, Expr, FilterAction, FilterRule, FilterSpec, PathStep};
use crate::context::EvalContext;
use crate::path::{self, SubEval};
use crate::stream;
use futures::future::{BoxFuture, FutureExt};
use pdp_core::{EvalError, Value};
use std::cmp::Ordering;

/// One concrete step of a resolved site path — a selector step after
/// wildcards/unions/conditions have been expanded into actual keys/indices.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ResolvedStep {
    Key(String),
    Index(usize),
}

/// Apply a transformation operator (`base |- spec`) to `base`, returning a
/// new value; `base` itself is never mutated (spec §4.5 post-condition).
pub fn apply_transform(base: Value, spec: &FilterSpec, ctx: &EvalContext, eval: &SubEval) -> Value {
    if base.is_error() {
        return base;
    }
    match spec {
        FilterSpec::Function { name, extra_args } => {
            let site_ctx = ctx.with_relative(base.clone());
            let mut args = vec![base];
            args.extend(extra_args.iter().map(|a| eval(a, &site_ctx)));
            ctx.functions.call(name, &args)
        }
        FilterSpec::Remove => Value::error(EvalError::RemoveRoot),
        FilterSpec::Rules(rules) => apply_rules(base, rules, ctx, eval),
    }
}

fn apply_rules(base: Value, rules: &[FilterRule], ctx: &EvalContext, eval: &SubEval) -> Value {
    let mut targets: Vec<(Vec<ResolvedStep>, &FilterAction)> = Vec::new();

    for rule in rules {
        let mut sites = Vec::new();
        resolve_sites(&base, Vec::new(), &rule.selector, ctx, eval, &mut sites);

        for site in sites {
            if rule.each {
                match get_at(&base, &site) {
                    Value::Array(items) => {
                        for idx in 0..items.len() {
                            let mut p = site.clone();
                            p.push(ResolvedStep::Index(idx));
                            targets.push((p, &rule.action));
                        }
                    }
                    _ => {
                        return Value::error(EvalError::NonArrayEach(
                            "`each` selector did not resolve to an array".to_string(),
                        ))
                    }
                }
            } else {
                targets.push((site, &rule.action));
            }
        }
    }

    targets.sort_by(|a, b| path_cmp(&a.0, &b.0));

    let mut result = base;
    for (path, action) in targets {
        if path.is_empty() {
            return Value::error(EvalError::RemoveRoot);
        }
        result = set_at(result, &path, &mut |old: Value| -> Option<Value> {
            match action {
                FilterAction::Remove => None,
                FilterAction::Call { name, args } => {
                    let site_ctx = ctx.with_relative(old);
                    let arg_values: Vec<Value> = args.iter().map(|a| eval(a, &site_ctx)).collect();
                    Some(ctx.functions.call(name, &arg_values))
                }
            }
        });
    }
    result
}

/// Deepest-first, then rightmost-first (spec §4.5): a longer path sorts
/// before a shorter prefix of it; among siblings, higher indices and
/// lexicographically later keys sort first, so applying one target never
/// shifts the position of another still to come.
fn path_cmp(a: &[ResolvedStep], b: &[ResolvedStep]) -> Ordering {
    let shared = a.len().min(b.len());
    for i in 0..shared {
        let c = match (&a[i], &b[i]) {
            (ResolvedStep::Index(x), ResolvedStep::Index(y)) => y.cmp(x),
            (ResolvedStep::Key(x), ResolvedStep::Key(y)) => y.cmp(x),
            (ResolvedStep::Index(_), ResolvedStep::Key(_)) => Ordering::Less,
            (ResolvedStep::Key(_), ResolvedStep::Index(_)) => Ordering::Greater,
        };
        if c != Ordering::Equal {
            return c;
        }
    }
    b.len().cmp(&a.len())
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

/// Expand `steps` against `current`, recording every concrete path that
/// matches (a selector may match zero, one, or many sites).
fn resolve_sites(
    current: &Value,
    prefix: Vec<ResolvedStep>,
    steps: &[PathStep],
    ctx: &EvalContext,
    eval: &SubEval,
    out: &mut Vec<Vec<ResolvedStep>>,
) {
    let Some((step, rest)) = steps.split_first() else {
        out.push(prefix);
        return;
    };

    match step {
        PathStep::Key(name) => {
            if let Value::Object(o) = current {
                if let Some(child) = o.get(name) {
                    let mut p = prefix.clone();
                    p.push(ResolvedStep::Key(name.clone()));
                    resolve_sites(child, p, rest, ctx, eval, out);
                }
            }
        }
        PathStep::Index(i) => {
            if let Value::Array(items) = current {
                if let Some(idx) = normalize_index(*i, items.len()) {
                    let mut p = prefix.clone();
                    p.push(ResolvedStep::Index(idx));
                    resolve_sites(&items[idx], p, rest, ctx, eval, out);
                }
            }
        }
        PathStep::IndexUnion(indices) => {
            if let Value::Array(items) = current {
                for &i in indices {
                    if let Some(idx) = normalize_index(i, items.len()) {
                        let mut p = prefix.clone();
                        p.push(ResolvedStep::Index(idx));
                        resolve_sites(&items[idx], p, rest, ctx, eval, out);
                    }
                }
            }
        }
        PathStep::KeyUnion(keys) => {
            if let Value::Object(o) = current {
                for k in keys {
                    if let Some(child) = o.get(k) {
                        let mut p = prefix.clone();
                        p.push(ResolvedStep::Key(k.clone()));
                        resolve_sites(child, p, rest, ctx, eval, out);
                    }
                }
            }
        }
        PathStep::Wildcard => match current {
            Value::Array(items) => {
                for (idx, item) in items.iter().enumerate() {
                    let mut p = prefix.clone();
                    p.push(ResolvedStep::Index(idx));
                    resolve_sites(item, p, rest, ctx, eval, out);
                }
            }
            Value::Object(o) => {
                for (k, v) in o {
                    let mut p = prefix.clone();
                    p.push(ResolvedStep::Key(k.clone()));
                    resolve_sites(v, p, rest, ctx, eval, out);
                }
            }
            _ => {}
        },
        PathStep::RecursiveKey(name) => {
            let mut matches = Vec::new();
            collect_recursive_key(current, name, prefix.clone(), &mut matches);
            for (p, v) in matches {
                resolve_sites(&v, p, rest, ctx, eval, out);
            }
        }
        PathStep::RecursiveIndex(i) => {
            let mut matches = Vec::new();
            collect_recursive_index(current, *i, prefix.clone(), &mut matches);
            for (p, v) in matches {
                resolve_sites(&v, p, rest, ctx, eval, out);
            }
        }
        PathStep::RecursiveWildcard => {
            let mut matches = Vec::new();
            collect_recursive_all(current, prefix.clone(), &mut matches);
            for (p, v) in matches {
                resolve_sites(&v, p, rest, ctx, eval, out);
            }
        }
        PathStep::ExprStep(expr) => {
            let site_ctx = ctx.with_relative(current.clone());
            match eval(expr, &site_ctx) {
                Value::Text(name) => {
                    if let Value::Object(o) = current {
                        if let Some(child) = o.get(&name) {
                            let mut p = prefix.clone();
                            p.push(ResolvedStep::Key(name));
                            resolve_sites(child, p, rest, ctx, eval, out);
                        }
                    }
                }
                Value::Num(n) => {
                    if let Value::Array(items) = current {
                        let i: i64 = n.trunc().to_string().parse().unwrap_or(0);
                        if let Some(idx) = normalize_index(i, items.len()) {
                            let mut p = prefix.clone();
                            p.push(ResolvedStep::Index(idx));
                            resolve_sites(&items[idx], p, rest, ctx, eval, out);
                        }
                    }
                }
                _ => {}
            }
        }
        PathStep::ConditionStep(expr) => {
            let entries: Vec<(ResolvedStep, Value)> = match current {
                Value::Array(items) => {
                    items.iter().enumerate().map(|(i, v)| (ResolvedStep::Index(i), v.clone())).collect()
                }
                Value::Object(o) => {
                    o.iter().map(|(k, v)| (ResolvedStep::Key(k.clone()), v.clone())).collect()
                }
                _ => Vec::new(),
            };
            for (step, value) in entries {
                let site_ctx = ctx.with_relative(value.clone());
                if let Value::Bool(true) = eval(expr, &site_ctx) {
                    let mut p = prefix.clone();
                    p.push(step);
                    resolve_sites(&value, p, rest, ctx, eval, out);
                }
            }
        }
        PathStep::Slice { .. } => {
            // A slice site is a contiguous run, not a single addressable
            // node; spec §4.5 only ever selects nodes, so a slice step
            // inside a selector matches each element in range individually.
            if let Value::Array(items) = current {
                for idx in 0..items.len() {
                    let mut p = prefix.clone();
                    p.push(ResolvedStep::Index(idx));
                    resolve_sites(&items[idx], p, rest, ctx, eval, out);
                }
            }
        }
        PathStep::AttributeFinder { .. } => {
            // A selector referencing a finder makes the whole `FilterSpec`
            // classify as `Stream` (spec §4.4), so `apply_transform_async`
            // handles it instead; this synchronous path never reaches it.
        }
    }
}

fn collect_recursive_key(v: &Value, name: &str, prefix: Vec<ResolvedStep>, out: &mut Vec<(Vec<ResolvedStep>, Value)>) {
    match v {
        Value::Object(o) => {
            if let Some(found) = o.get(name) {
                let mut p = prefix.clone();
                p.push(ResolvedStep::Key(name.to_string()));
                out.push((p, found.clone()));
            }
            for (k, value) in o {
                let mut p = prefix.clone();
                p.push(ResolvedStep::Key(k.clone()));
                collect_recursive_key(value, name, p, out);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let mut p = prefix.clone();
                p.push(ResolvedStep::Index(i));
                collect_recursive_key(item, name, p, out);
            }
        }
        _ => {}
    }
}

fn collect_recursive_index(v: &Value, i: i64, prefix: Vec<ResolvedStep>, out: &mut Vec<(Vec<ResolvedStep>, Value)>) {
    match v {
        Value::Array(items) => {
            if let Some(idx) = normalize_index(i, items.len()) {
                let mut p = prefix.clone();
                p.push(ResolvedStep::Index(idx));
                out.push((p, items[idx].clone()));
            }
            for (idx, item) in items.iter().enumerate() {
                let mut p = prefix.clone();
                p.push(ResolvedStep::Index(idx));
                collect_recursive_index(item, i, p, out);
            }
        }
        Value::Object(o) => {
            for (k, value) in o {
                let mut p = prefix.clone();
                p.push(ResolvedStep::Key(k.clone()));
                collect_recursive_index(value, i, p, out);
            }
        }
        _ => {}
    }
}

fn collect_recursive_all(v: &Value, prefix: Vec<ResolvedStep>, out: &mut Vec<(Vec<ResolvedStep>, Value)>) {
    match v {
        Value::Object(o) => {
            for (k, value) in o {
                let mut p = prefix.clone();
                p.push(ResolvedStep::Key(k.clone()));
                out.push((p.clone(), value.clone()));
                collect_recursive_all(value, p, out);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let mut p = prefix.clone();
                p.push(ResolvedStep::Index(i));
                out.push((p.clone(), item.clone()));
                collect_recursive_all(item, p, out);
            }
        }
        _ => {}
    }
}

fn get_at(base: &Value, path: &[ResolvedStep]) -> Value {
    let mut current = base;
    for step in path {
        current = match (step, current) {
            (ResolvedStep::Key(k), Value::Object(o)) => match o.get(k) {
                Some(v) => v,
                None => return Value::Undefined,
            },
            (ResolvedStep::Index(i), Value::Array(items)) => match items.get(*i) {
                Some(v) => v,
                None => return Value::Undefined,
            },
            _ => return Value::Undefined,
        };
    }
    current.clone()
}

/// Rebuild `value` with the node at `path` replaced by `f(old)`, or
/// removed entirely when `f` returns `None`. Never mutates in place.
fn set_at(value: Value, path: &[ResolvedStep], f: &mut dyn FnMut(Value) -> Option<Value>) -> Value {
    let Some((step, rest)) = path.split_first() else {
        return value;
    };
    match (step, value) {
        (ResolvedStep::Key(k), Value::Object(mut o)) => {
            if rest.is_empty() {
                let old = o.shift_remove(k).unwrap_or(Value::Undefined);
                if let Some(new_value) = f(old) {
                    o.insert(k.clone(), new_value);
                }
            } else if let Some(child) = o.get(k).cloned() {
                let updated = set_at(child, rest, f);
                o.insert(k.clone(), updated);
            }
            Value::Object(o)
        }
        (ResolvedStep::Index(i), Value::Array(mut items)) => {
            if rest.is_empty() {
                if *i < items.len() {
                    let old = items.remove(*i);
                    if let Some(new_value) = f(old) {
                        items.insert(*i, new_value);
                    }
                }
            } else if *i < items.len() {
                let child = items[*i].clone();
                items[*i] = set_at(child, rest, f);
            }
            Value::Array(items)
        }
        (_, other) => other,
    }
}

/// Async counterpart of [`apply_transform`], reached whenever `spec`
/// references an attribute finder — either in a selector step (spec §8
/// scenario 5's `each @.<echo>`) or in a call's arguments.
pub async fn apply_transform_async(base: Value, spec: &FilterSpec, ctx: &EvalContext) -> Value {
    if base.is_error() {
        return base;
    }
    match spec {
        FilterSpec::Function { name, extra_args } => {
            let site_ctx = ctx.with_relative(base.clone());
            let mut args = vec![base];
            for a in extra_args {
                args.push(stream::eval_once(a, &site_ctx).await);
            }
            ctx.functions.call(name, &args)
        }
        FilterSpec::Remove => Value::error(EvalError::RemoveRoot),
        FilterSpec::Rules(rules) => apply_rules_async(base, rules, ctx).await,
    }
}

async fn apply_rules_async(base: Value, rules: &[FilterRule], ctx: &EvalContext) -> Value {
    let mut targets: Vec<(Vec<ResolvedStep>, &FilterAction)> = Vec::new();
    let mut base = base;

    for rule in rules {
        let mut sites = Vec::new();
        base = resolve_sites_async(base, Vec::new(), &rule.selector, ctx, &mut sites).await;

        for site in sites {
            if rule.each {
                match get_at(&base, &site) {
                    Value::Array(items) => {
                        for idx in 0..items.len() {
                            let mut p = site.clone();
                            p.push(ResolvedStep::Index(idx));
                            targets.push((p, &rule.action));
                        }
                    }
                    _ => {
                        return Value::error(EvalError::NonArrayEach(
                            "`each` selector did not resolve to an array".to_string(),
                        ))
                    }
                }
            } else {
                targets.push((site, &rule.action));
            }
        }
    }

    targets.sort_by(|a, b| path_cmp(&a.0, &b.0));

    let mut result = base;
    for (path, action) in targets {
        if path.is_empty() {
            return Value::error(EvalError::RemoveRoot);
        }
        let new_value = match action {
            FilterAction::Remove => None,
            FilterAction::Call { name, args } => {
                let old = get_at(&result, &path);
                let site_ctx = ctx.with_relative(old);
                let mut arg_values = Vec::with_capacity(args.len());
                for a in args {
                    arg_values.push(stream::eval_once(a, &site_ctx).await);
                }
                Some(ctx.functions.call(name, &arg_values))
            }
        };
        result = set_at(result, &path, &mut |_old| new_value.clone());
    }
    result
}

/// Async counterpart of [`resolve_sites`]: whenever a selector step fetches
/// an attribute, the fetched value is substituted back into `base` at the
/// site's current address, so that every later `get_at`/`each`-expansion/
/// `set_at` call — which all read from `base`'s literal tree — sees it
/// instead of the pre-fetch value (correct for any finder, not only one
/// that happens to return its input unchanged). Rust has no recursive
/// `async fn`, hence the explicit boxed future.
fn resolve_sites_async<'a>(
    base: Value,
    prefix: Vec<ResolvedStep>,
    steps: &'a [PathStep],
    ctx: &'a EvalContext,
    out: &'a mut Vec<Vec<ResolvedStep>>,
) -> BoxFuture<'a, Value> {
    async move {
        let Some((step, rest)) = steps.split_first() else {
            out.push(prefix);
            return base;
        };

        let current = get_at(&base, &prefix);

        match step {
            PathStep::Key(name) => {
                if matches!(&current, Value::Object(o) if o.contains_key(name)) {
                    let mut p = prefix.clone();
                    p.push(ResolvedStep::Key(name.clone()));
                    return resolve_sites_async(base, p, rest, ctx, out).await;
                }
                base
            }
            PathStep::Index(i) => {
                if let Value::Array(items) = &current {
                    if let Some(idx) = normalize_index(*i, items.len()) {
                        let mut p = prefix.clone();
                        p.push(ResolvedStep::Index(idx));
                        return resolve_sites_async(base, p, rest, ctx, out).await;
                    }
                }
                base
            }
            PathStep::IndexUnion(indices) => {
                let len = match &current {
                    Value::Array(items) => items.len(),
                    _ => return base,
                };
                let mut base = base;
                for &i in indices {
                    if let Some(idx) = normalize_index(i, len) {
                        let mut p = prefix.clone();
                        p.push(ResolvedStep::Index(idx));
                        base = resolve_sites_async(base, p, rest, ctx, out).await;
                    }
                }
                base
            }
            PathStep::KeyUnion(keys) => {
                if !matches!(&current, Value::Object(_)) {
                    return base;
                }
                let mut base = base;
                for k in keys {
                    let has_key = matches!(get_at(&base, &prefix), Value::Object(o) if o.contains_key(k));
                    if has_key {
                        let mut p = prefix.clone();
                        p.push(ResolvedStep::Key(k.clone()));
                        base = resolve_sites_async(base, p, rest, ctx, out).await;
                    }
                }
                base
            }
            PathStep::Wildcard | PathStep::Slice { .. } => {
                let mut base = base;
                match &current {
                    Value::Array(items) => {
                        for idx in 0..items.len() {
                            let mut p = prefix.clone();
                            p.push(ResolvedStep::Index(idx));
                            base = resolve_sites_async(base, p, rest, ctx, out).await;
                        }
                    }
                    Value::Object(o) if matches!(step, PathStep::Wildcard) => {
                        let keys: Vec<String> = o.keys().cloned().collect();
                        for k in keys {
                            let mut p = prefix.clone();
                            p.push(ResolvedStep::Key(k));
                            base = resolve_sites_async(base, p, rest, ctx, out).await;
                        }
                    }
                    _ => {}
                }
                base
            }
            PathStep::RecursiveKey(name) => {
                let mut matches = Vec::new();
                collect_recursive_key(&current, name, prefix.clone(), &mut matches);
                let mut base = base;
                for (p, _) in matches {
                    base = resolve_sites_async(base, p, rest, ctx, out).await;
                }
                base
            }
            PathStep::RecursiveIndex(i) => {
                let mut matches = Vec::new();
                collect_recursive_index(&current, *i, prefix.clone(), &mut matches);
                let mut base = base;
                for (p, _) in matches {
                    base = resolve_sites_async(base, p, rest, ctx, out).await;
                }
                base
            }
            PathStep::RecursiveWildcard => {
                let mut matches = Vec::new();
                collect_recursive_all(&current, prefix.clone(), &mut matches);
                let mut base = base;
                for (p, _) in matches {
                    base = resolve_sites_async(base, p, rest, ctx, out).await;
                }
                base
            }
            PathStep::ExprStep(expr) => {
                let site_ctx = ctx.with_relative(current.clone());
                match stream::eval_once(expr, &site_ctx).await {
                    Value::Text(name) => {
                        if matches!(&current, Value::Object(o) if o.contains_key(&name)) {
                            let mut p = prefix.clone();
                            p.push(ResolvedStep::Key(name));
                            return resolve_sites_async(base, p, rest, ctx, out).await;
                        }
                        base
                    }
                    Value::Num(n) => {
                        if let Value::Array(items) = &current {
                            let i: i64 = n.trunc().to_string().parse().unwrap_or(0);
                            if let Some(idx) = normalize_index(i, items.len()) {
                                let mut p = prefix.clone();
                                p.push(ResolvedStep::Index(idx));
                                return resolve_sites_async(base, p, rest, ctx, out).await;
                            }
                        }
                        base
                    }
                    _ => base,
                }
            }
            PathStep::ConditionStep(expr) => {
                let entries: Vec<ResolvedStep> = match &current {
                    Value::Array(items) => (0..items.len()).map(ResolvedStep::Index).collect(),
                    Value::Object(o) => o.keys().cloned().map(ResolvedStep::Key).collect(),
                    _ => Vec::new(),
                };
                let mut base = base;
                for step in entries {
                    let mut p = prefix.clone();
                    p.push(step.clone());
                    let value = get_at(&base, &p);
                    let site_ctx = ctx.with_relative(value);
                    if let Value::Bool(true) = stream::eval_once(expr, &site_ctx).await {
                        base = resolve_sites_async(base, p, rest, ctx, out).await;
                    }
                }
                base
            }
            PathStep::AttributeFinder { name, args, opts } => {
                if current.is_error() {
                    return base;
                }
                let site_ctx = ctx.with_relative(current.clone());
                let mut arg_values = Vec::with_capacity(args.len());
                for a in args {
                    arg_values.push(stream::eval_once(a, &site_ctx).await);
                }
                let fetched = stream::fetch_attribute_once(Some(current), name, arg_values, opts, &site_ctx).await;
                let base = if prefix.is_empty() {
                    fetched
                } else {
                    set_at(base, &prefix, &mut |_| Some(fetched.clone()))
                };
                resolve_sites_async(base, prefix, rest, ctx, out).await
            }
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EvalMode, FunctionContext};
    use pdp_core::{PdpConfig, Subscription};
    use pdp_functions::{builtins, FunctionRegistry, ImportTable};
    use std::sync::Arc;

    fn ctx() -> EvalContext {
        let mut registry = FunctionRegistry::new();
        registry.register(builtins::filter_library());
        let functions = FunctionContext {
            registry: Arc::new(registry),
            imports: Arc::new(ImportTable::build(&[pdp_functions::Import::Wildcard { library: "filter".into() }])),
        };
        EvalContext::new(Arc::new(Subscription::default()), functions, None, None, Arc::new(PdpConfig::default()), EvalMode::Normal)
    }

    fn noop_eval(e: &Expr, ctx: &EvalContext) -> Value {
        match e {
            Expr::RelativeContext => ctx.relative.clone().unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }

    #[test]
    fn remove_rule_deletes_matched_key() {
        let mut map = indexmap::IndexMap::new();
        map.insert("ssn".to_string(), Value::text("123-45-6789"));
        map.insert("name".to_string(), Value::text("alice"));
        let base = Value::Object(map);
        let rules = vec![FilterRule {
            each: false,
            selector: vec![PathStep::Key("ssn".into())],
            action: FilterAction::Remove,
        }];
        let out = apply_transform(base, &FilterSpec::Rules(rules), &ctx(), &noop_eval);
        let Value::Object(o) = out else { panic!("expected object") };
        assert!(!o.contains_key("ssn"));
        assert!(o.contains_key("name"));
    }

    #[test]
    fn each_distributes_action_over_array_elements() {
        let mut map = indexmap::IndexMap::new();
        map.insert(
            "items".to_string(),
            Value::Array(vec![Value::text("a"), Value::text("b")]),
        );
        let base = Value::Object(map);
        let rules = vec![FilterRule {
            each: true,
            selector: vec![PathStep::Key("items".into())],
            action: FilterAction::Call { name: "blacken".into(), args: vec![Expr::RelativeContext] },
        }];
        let out = apply_transform(base, &FilterSpec::Rules(rules), &ctx(), &noop_eval);
        let Value::Object(o) = out else { panic!("expected object") };
        let Some(Value::Array(items)) = o.get("items") else { panic!("expected array") };
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], Value::Text(_)));
    }

    #[test]
    fn each_over_non_array_is_error() {
        let mut map = indexmap::IndexMap::new();
        map.insert("items".to_string(), Value::int(1));
        let base = Value::Object(map);
        let rules = vec![FilterRule {
            each: true,
            selector: vec![PathStep::Key("items".into())],
            action: FilterAction::Remove,
        }];
        let out = apply_transform(base, &FilterSpec::Rules(rules), &ctx(), &noop_eval);
        assert!(out.is_error());
    }

    #[test]
    fn unmatched_selector_is_a_no_op() {
        let map: indexmap::IndexMap<String, Value> = Default::default();
        let base = Value::Object(map.clone());
        let rules = vec![FilterRule {
            each: false,
            selector: vec![PathStep::Key("missing".into())],
            action: FilterAction::Remove,
        }];
        let out = apply_transform(Value::Object(map), &FilterSpec::Rules(rules), &ctx(), &noop_eval);
        assert_eq!(out, Value::Object(Default::default()));
    }

    #[test]
    fn function_filter_spec_applies_to_whole_base() {
        let out = apply_transform(Value::text("secret"), &FilterSpec::Function { name: "blacken".into(), extra_args: vec![] }, &ctx(), &noop_eval);
        assert!(matches!(out, Value::Text(_)));
    }
}
