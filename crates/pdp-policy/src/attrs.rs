//! Static collection of attribute-finder names referenced by an
//! expression (spec §4.7 "aggregation of contributing attributes" —
//! see DESIGN.md for why this is name-based rather than a true runtime
//! subscription-key trace).

use pdp_eval::{Expr, FilterAction, FilterSpec, PathStep};

/// Every attribute-finder name `expr` could reference, in first-occurrence
/// order, deduplicated.
pub fn collect(expr: &Expr) -> Vec<String> {
    let mut names = Vec::new();
    walk(expr, &mut names);
    names
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

fn walk(expr: &Expr, names: &mut Vec<String>) {
    match expr {
        Expr::Null | Expr::Bool(_) | Expr::Num(_) | Expr::Text(_) | Expr::Var(_) | Expr::RelativeContext => {}
        Expr::Array(items) => items.iter().for_each(|e| walk(e, names)),
        Expr::Object(fields) => fields.iter().for_each(|(_, v)| walk(v, names)),
        Expr::BinArith { lhs, rhs, .. } | Expr::BinBool { lhs, rhs, .. } | Expr::BinRel { lhs, rhs, .. } => {
            walk(lhs, names);
            walk(rhs, names);
        }
        Expr::Regex { text, pattern } => {
            walk(text, names);
            walk(pattern, names);
        }
        Expr::Neg(e) | Expr::Not(e) => walk(e, names),
        Expr::Path { base, steps } => {
            walk(base, names);
            for step in steps {
                walk_path_step(step, names);
            }
        }
        Expr::Call { args, .. } => args.iter().for_each(|e| walk(e, names)),
        Expr::AttributeFinder { entity, name, args, .. } => {
            if let Some(e) = entity {
                walk(e, names);
            }
            args.iter().for_each(|e| walk(e, names));
            push_unique(names, name);
        }
        Expr::Transform { base, spec } => {
            walk(base, names);
            walk_filter_spec(spec, names);
        }
        Expr::Subtemplate { base, template } => {
            walk(base, names);
            walk(template, names);
        }
        Expr::VarDef { value, body, .. } => {
            walk(value, names);
            walk(body, names);
        }
        Expr::WhereBody(stmts) => stmts.iter().for_each(|e| walk(e, names)),
    }
}

fn walk_filter_spec(spec: &FilterSpec, names: &mut Vec<String>) {
    match spec {
        FilterSpec::Function { extra_args, .. } => extra_args.iter().for_each(|e| walk(e, names)),
        FilterSpec::Remove => {}
        FilterSpec::Rules(rules) => {
            for rule in rules {
                for step in &rule.selector {
                    walk_path_step(step, names);
                }
                if let FilterAction::Call { args, .. } = &rule.action {
                    args.iter().for_each(|e| walk(e, names));
                }
            }
        }
    }
}

/// A selector step's own finder reference plus any sub-expression it wraps
/// (spec §8 scenario 5's `each @.<echo>` must surface `echo` here the same
/// as an `Expr::AttributeFinder` would, or the contributing-attributes
/// aggregation silently misses it).
fn walk_path_step(step: &PathStep, names: &mut Vec<String>) {
    match step {
        PathStep::ExprStep(e) | PathStep::ConditionStep(e) => walk(e, names),
        PathStep::AttributeFinder { name, args, .. } => {
            args.iter().for_each(|e| walk(e, names));
            push_unique(names, name);
        }
        _ => {}
    }
}
