//! Attribute-finder registration (spec §4.3: "Attribute-finder registration
//! mirrors §4.2: entities are looked up by fully qualified name"). Unlike
//! the function broker there is no alias/wildcard import layer — a policy
//! references a finder by its one fully qualified name.

use crate::finder::AttributeFinder;
use pdp_core::EvalError;
use std::collections::HashMap;
use std::sync::Arc;

/// The set of attribute finders a PDP configuration makes available,
/// keyed by fully qualified name.
#[derive(Clone, Default)]
pub struct AttributeFinderRegistry {
    finders: HashMap<String, Arc<dyn AttributeFinder>>,
}

impl AttributeFinderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `finder` under `name`, replacing any previous finder of
    /// the same name.
    pub fn register(&mut self, name: impl Into<String>, finder: Arc<dyn AttributeFinder>) {
        self.finders.insert(name.into(), finder);
    }

    /// Resolve `name` to its registered finder, or `UnboundReference` if
    /// nothing was registered under it.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn AttributeFinder>, EvalError> {
        self.finders.get(name).cloned().ok_or_else(|| EvalError::UnboundReference(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder::ConstantFinder;
    use pdp_core::Value;

    #[test]
    fn resolves_a_registered_finder_by_name() {
        let mut reg = AttributeFinderRegistry::new();
        reg.register("risk_score", Arc::new(ConstantFinder(Value::int(1))));
        assert!(reg.resolve("risk_score").is_ok());
    }

    #[test]
    fn unregistered_name_is_unbound_reference() {
        let reg = AttributeFinderRegistry::new();
        assert!(matches!(reg.resolve("nope"), Err(EvalError::UnboundReference(_))));
    }
}
