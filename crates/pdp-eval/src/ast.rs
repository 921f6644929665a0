//! The fixed expression AST (SPEC_FULL §4.4.1). Grammar parsing is out of
//! scope; this is the tree a (hypothetical) parser collaborator hands the
//! evaluator.

use rust_decimal::Decimal;

/// Arithmetic operators (`+ - * /`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Boolean operators (`&& ||`); `!` is [`Expr::Not`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

/// Relational operators (`< <= > >= == !=`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// Per-invocation overrides for an attribute-finder call, each an
/// expression evaluated in the enclosing pure scope (spec §3 timing
/// parameters, §4.3 freshness).
#[derive(Debug, Clone, Default)]
pub struct AttributeOpts {
    /// `fresh` — bypass station sharing for this subscription.
    pub fresh: Option<Box<Expr>>,
    /// `initialTimeout` override.
    pub initial_timeout: Option<Box<Expr>>,
    /// `pollInterval` override.
    pub poll_interval: Option<Box<Expr>>,
    /// `backoff` override.
    pub backoff: Option<Box<Expr>>,
    /// `retries` override.
    pub retries: Option<Box<Expr>>,
    /// `linger` override for this station's eviction delay.
    pub linger: Option<Box<Expr>>,
}

/// A step in a path-navigation chain (spec §4.4).
#[derive(Debug, Clone)]
pub enum PathStep {
    /// `.key`
    Key(String),
    /// `[i]`, negative counts from the end.
    Index(i64),
    /// `[start:end:step]`.
    Slice { start: Option<i64>, end: Option<i64>, step: i64 },
    /// `.*`
    Wildcard,
    /// `..key`
    RecursiveKey(String),
    /// `..[i]`, out-of-range indices at any level are skipped rather than
    /// erroring (spec §7).
    RecursiveIndex(i64),
    /// `..*`
    RecursiveWildcard,
    /// `[a,b,c]` over indices.
    IndexUnion(Vec<i64>),
    /// `["a","b"]` over keys.
    KeyUnion(Vec<String>),
    /// `[(expr)]`
    ExprStep(Box<Expr>),
    /// `[?(expr)]`
    ConditionStep(Box<Expr>),
    /// `.<name(args)>`, entity implicitly the step's current site (spec §8
    /// scenario 5's `@.<echo>`). Environment-scoped finders never appear
    /// here — a selector always navigates from a concrete value.
    AttributeFinder { name: String, args: Vec<Expr>, opts: AttributeOpts },
}

/// A filter/selection-engine action (spec §4.5).
#[derive(Debug, Clone)]
pub enum FilterAction {
    /// Call a registered function, `@` bound to the site's current value.
    Call { name: String, args: Vec<Expr> },
    /// Delete the site.
    Remove,
}

/// One `selector: action` rule inside a braced filter spec.
#[derive(Debug, Clone)]
pub struct FilterRule {
    /// Whether the selector is prefixed with `each` (site must be an array).
    pub each: bool,
    /// Path steps locating the rule's target site(s), rooted at `@`.
    pub selector: Vec<PathStep>,
    /// What to do at each matched site.
    pub action: FilterAction,
}

/// The transformation-operator spec (`|- filterSpec`, spec §4.5).
#[derive(Debug, Clone)]
pub enum FilterSpec {
    /// A single function reference applied to the whole base value.
    Function { name: String, extra_args: Vec<Expr> },
    /// Delete the whole base value (only valid when nested, not at the root).
    Remove,
    /// A braced list of selector/action rules.
    Rules(Vec<FilterRule>),
}

/// The expression tree (spec §4.4, node kinds enumerated exhaustively).
#[derive(Debug, Clone)]
pub enum Expr {
    Null,
    Bool(bool),
    Num(Decimal),
    Text(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    /// A free identifier (spec §4.4: local -> set variable -> subscription
    /// field -> unbound error).
    Var(String),
    BinArith { op: ArithOp, lhs: Box<Expr>, rhs: Box<Expr> },
    BinBool { op: BoolOp, lhs: Box<Expr>, rhs: Box<Expr> },
    BinRel { op: RelOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// `lhs =~ rhs`
    Regex { text: Box<Expr>, pattern: Box<Expr> },
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Path { base: Box<Expr>, steps: Vec<PathStep> },
    Call { name: String, args: Vec<Expr> },
    /// `entity.<name(args)[opts]>`; `entity: None` is the environment form
    /// `<name(args)[opts]>`.
    AttributeFinder { entity: Option<Box<Expr>>, name: String, args: Vec<Expr>, opts: AttributeOpts },
    /// `base |- spec`
    Transform { base: Box<Expr>, spec: FilterSpec },
    /// `base :: template`
    Subtemplate { base: Box<Expr>, template: Box<Expr> },
    /// `var name = value; body`
    VarDef { name: String, value: Box<Expr>, body: Box<Expr> },
    /// A where-body: sequence of statements, each must be boolean `true`.
    WhereBody(Vec<Expr>),
    /// `@`, the current relative-context element.
    RelativeContext,
}

impl Expr {
    /// True if any node in this subtree is an [`Expr::AttributeFinder`]
    /// (spec §4.4 classification: "`Stream` if any subtree references an
    /// attribute finder").
    pub fn references_attribute_finder(&self) -> bool {
        match self {
            Expr::Null | Expr::Bool(_) | Expr::Num(_) | Expr::Text(_) | Expr::Var(_) | Expr::RelativeContext => false,
            Expr::Array(items) => items.iter().any(Expr::references_attribute_finder),
            Expr::Object(fields) => fields.iter().any(|(_, v)| v.references_attribute_finder()),
            Expr::BinArith { lhs, rhs, .. } | Expr::BinBool { lhs, rhs, .. } | Expr::BinRel { lhs, rhs, .. } => {
                lhs.references_attribute_finder() || rhs.references_attribute_finder()
            }
            Expr::Regex { text, pattern } => {
                text.references_attribute_finder() || pattern.references_attribute_finder()
            }
            Expr::Neg(e) | Expr::Not(e) => e.references_attribute_finder(),
            Expr::Path { base, steps } => {
                base.references_attribute_finder() || steps.iter().any(path_step_references_attribute_finder)
            }
            Expr::Call { args, .. } => args.iter().any(Expr::references_attribute_finder),
            Expr::AttributeFinder { .. } => true,
            Expr::Transform { base, spec } => {
                base.references_attribute_finder() || filter_spec_references_attribute_finder(spec)
            }
            Expr::Subtemplate { base, template } => {
                base.references_attribute_finder() || template.references_attribute_finder()
            }
            Expr::VarDef { value, body, .. } => {
                value.references_attribute_finder() || body.references_attribute_finder()
            }
            Expr::WhereBody(stmts) => stmts.iter().any(Expr::references_attribute_finder),
        }
    }
}

/// True if `step` itself (ignoring any sibling step) can only be resolved
/// through the streaming evaluator.
fn path_step_references_attribute_finder(step: &PathStep) -> bool {
    match step {
        PathStep::AttributeFinder { .. } => true,
        PathStep::ExprStep(e) | PathStep::ConditionStep(e) => e.references_attribute_finder(),
        _ => false,
    }
}

/// True if applying `spec` would need to invoke an attribute finder,
/// whether from a selector step (spec §8 scenario 5's `each @.<echo>`) or
/// from a call's arguments.
pub(crate) fn filter_spec_references_attribute_finder(spec: &FilterSpec) -> bool {
    match spec {
        FilterSpec::Function { extra_args, .. } => extra_args.iter().any(Expr::references_attribute_finder),
        FilterSpec::Remove => false,
        FilterSpec::Rules(rules) => rules.iter().any(|r| {
            r.selector.iter().any(path_step_references_attribute_finder)
                || match &r.action {
                    FilterAction::Call { args, .. } => args.iter().any(Expr::references_attribute_finder),
                    FilterAction::Remove => false,
                }
        }),
    }
}
