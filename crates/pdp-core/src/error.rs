//! Error taxonomy (spec §7) propagated as `Value::Error` during evaluation
//! and collapsed to `Decision::Indeterminate` at the policy boundary.

use thiserror::Error;

/// One evaluation-time failure. Every variant corresponds to a §7 bullet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// An operator was applied to a value of the wrong kind.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// A variable or function name could not be resolved in scope.
    #[error("unbound reference: {0}")]
    UnboundReference(String),
    /// A function or attribute finder was invoked with the wrong argument count.
    #[error("arity mismatch: {0}")]
    ArityMismatch(String),
    /// An array index or slice fell outside the array's bounds.
    #[error("index out of bounds: {0}")]
    IndexOutOfBounds(String),
    /// `each` was applied to a selector site that is not an array.
    #[error("each requires an array site: {0}")]
    NonArrayEach(String),
    /// An index/slice/wildcard step was applied to a non-array, non-object value.
    #[error("index step requires an array or object: {0}")]
    NonArrayIndex(String),
    /// A key-union step was applied to a non-object value.
    #[error("key union requires an object: {0}")]
    NonObjectKeyUnion(String),
    /// An attribute finder was referenced from a policy target.
    #[error("attribute access is forbidden in a target expression")]
    AttributeInTarget,
    /// Two imports bound the same short name, or two wildcard imports collided.
    #[error("import conflict: {0}")]
    ImportConflict(String),
    /// An attribute finder failed after exhausting its retry budget.
    #[error("attribute upstream failed: {0}")]
    AttributeUpstream(String),
    /// `initialTimeout` elapsed before the station produced a value.
    #[error("attribute timeout")]
    Timeout,
    /// More than one contributing vote produced a resource transform.
    #[error("transformation uncertainty")]
    TransformationUncertainty,
    /// A `var` declaration reused a reserved subscription-field name.
    #[error("reserved name: {0}")]
    ReservedName(String),
    /// A regular expression used with `=~` failed to compile.
    #[error("invalid regex: {0}")]
    InvalidRegex(String),
    /// `@` was used outside a subtemplate, filter condition, or filter rule.
    #[error("'@' used outside a relative context")]
    NoRelativeContext,
    /// Removing the root of a filter's base value.
    #[error("cannot remove the root of a value")]
    RemoveRoot,
    /// Catch-all for messages that don't map onto a dedicated variant
    /// (e.g. a function plugin's own `Error(message)` return value).
    #[error("{0}")]
    Other(String),
}

impl EvalError {
    /// Build the generic [`EvalError::Other`] variant from any displayable message.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
