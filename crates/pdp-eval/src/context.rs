//! The evaluation context (spec §3): subscription, variable bindings,
//! function/attribute broker references, all cheaply cloneable so a
//! streaming sub-evaluation can carry its own copy across task boundaries.

use pdp_attributes::{AttributeBroker, AttributeFinderRegistry};
use pdp_core::{PdpConfig, Subscription, Value};
use pdp_functions::{FunctionRegistry, ImportTable};
use std::collections::HashMap;
use std::sync::Arc;

/// A chain of shadowing variable bindings (spec §4.4: "shadows any outer
/// binding with the same name").
#[derive(Debug, Default)]
pub struct Scope {
    parent: Option<Arc<Scope>>,
    bindings: HashMap<String, Value>,
}

impl Scope {
    /// An empty root scope.
    pub fn root() -> Arc<Scope> {
        Arc::new(Scope::default())
    }

    /// A child scope binding `name` to `value`, shadowing any outer
    /// binding of the same name.
    pub fn bind(self: &Arc<Self>, name: impl Into<String>, value: Value) -> Arc<Scope> {
        let mut bindings = HashMap::new();
        bindings.insert(name.into(), value);
        Arc::new(Scope { parent: Some(self.clone()), bindings })
    }

    /// Resolve `name` against this scope chain.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name).or_else(|| self.parent.as_deref().and_then(|p| p.get(name)))
    }

    /// Every binding visible from this scope, innermost shadowing outer
    /// (spec §3's "relevant-variables-snapshot" — the set-level and local
    /// variables an attribute-finder invocation closed over).
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        let mut node = Some(self);
        while let Some(s) = node {
            for (k, v) in &s.bindings {
                if seen.insert(k.clone()) {
                    out.push((k.clone(), v.clone()));
                }
            }
            node = s.parent.as_deref();
        }
        out
    }
}

/// Function resolution bundled with the import table it's resolved
/// through (one per document's evaluation context).
#[derive(Clone)]
pub struct FunctionContext {
    pub registry: Arc<FunctionRegistry>,
    pub imports: Arc<ImportTable>,
}

impl FunctionContext {
    /// Resolve `name` per spec §4.2's four-step order.
    pub fn resolve(&self, name: &str) -> Result<pdp_functions::Function, pdp_core::EvalError> {
        self.imports.resolve(name, &self.registry).map(pdp_functions::Function::clone)
    }

    /// Resolve and invoke `name` in one step, folding resolution failures
    /// into an `Error` value the same way an invocation failure would be.
    pub fn call(&self, name: &str, args: &[Value]) -> Value {
        match self.resolve(name) {
            Ok(f) => f.call(args),
            Err(e) => Value::error(e),
        }
    }
}

/// Whether attribute-finder nodes are permitted at this evaluation site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// A policy target: attribute access is forbidden (spec §4.3/§4.4).
    Target,
    /// Anywhere else: attribute access is permitted and switches the
    /// evaluator into streaming mode.
    Normal,
}

/// Immutable (modulo scope-chaining) evaluation context threaded through
/// the evaluator (spec §3's "Evaluation Context").
#[derive(Clone)]
pub struct EvalContext {
    pub subscription: Arc<Subscription>,
    pub scope: Arc<Scope>,
    pub functions: FunctionContext,
    pub attributes: Option<Arc<AttributeBroker>>,
    pub attribute_finders: Option<Arc<AttributeFinderRegistry>>,
    pub config: Arc<PdpConfig>,
    pub relative: Option<Value>,
    pub mode: EvalMode,
}

impl EvalContext {
    /// A fresh root context for evaluating one document against one
    /// subscription.
    pub fn new(
        subscription: Arc<Subscription>,
        functions: FunctionContext,
        attributes: Option<Arc<AttributeBroker>>,
        attribute_finders: Option<Arc<AttributeFinderRegistry>>,
        config: Arc<PdpConfig>,
        mode: EvalMode,
    ) -> Self {
        Self {
            subscription,
            scope: Scope::root(),
            functions,
            attributes,
            attribute_finders,
            config,
            relative: None,
            mode,
        }
    }

    /// Resolve a free identifier: local scope -> subscription field ->
    /// unbound (spec §4.4; set-level variables are folded into `scope`
    /// by the policy compiler before body evaluation, so this context
    /// only needs the two remaining tiers).
    pub fn resolve_var(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.scope.get(name) {
            return Some(v.clone());
        }
        self.subscription.field(name).cloned()
    }

    /// A derived context binding `name` to `value` (var-def, subtemplate
    /// parameters bound via [`EvalContext::with_relative`] instead).
    pub fn with_binding(&self, name: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.scope = self.scope.bind(name, value);
        next
    }

    /// A derived context with `@` bound to `value` (subtemplate/filter
    /// condition/filter rule; spec §4.4).
    pub fn with_relative(&self, value: Value) -> Self {
        let mut next = self.clone();
        next.relative = Some(value);
        next
    }

    /// A derived context switched to [`EvalMode::Target`] (policy target
    /// compilation forbids attribute access regardless of the ambient
    /// mode).
    pub fn as_target(&self) -> Self {
        let mut next = self.clone();
        next.mode = EvalMode::Target;
        next
    }
}
