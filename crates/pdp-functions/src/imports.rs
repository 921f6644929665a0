//! Import resolution (spec §4.2): aliasing, wildcard, and single-function
//! imports, with duplicate-import conflicts deferred to call time.

use crate::registry::{Function, FunctionRegistry};
use pdp_core::EvalError;
use std::collections::{HashMap, HashSet};

/// One import declaration in a document's evaluation context.
#[derive(Debug, Clone)]
pub enum Import {
    /// `import lib as alias` — `alias.fn` then resolves against `lib.fn`.
    Alias { library: String, alias: String },
    /// `import lib.*` — every function in `lib` becomes reachable under
    /// its own short name.
    Wildcard { library: String },
    /// `import lib.fn` — `fn` becomes reachable under its own short name.
    Single { library: String, function: String },
}

/// A document's resolved import table: the read-only view a compiled
/// expression's function calls are checked against.
///
/// Conflicts are recorded, not rejected, at build time (spec §4.2:
/// "the compiler records the conflict but does not fail at parse") —
/// [`ImportTable::resolve`] turns a conflicting name into
/// `Err(EvalError::ImportConflict)` only when something actually tries to
/// call it.
#[derive(Debug, Clone, Default)]
pub struct ImportTable {
    aliases: HashMap<String, String>,
    alias_conflicts: HashSet<String>,
    short_bindings: HashMap<String, (String, String)>,
    short_conflicts: HashSet<String>,
}

impl ImportTable {
    /// Build a table from a document's import declarations.
    pub fn build(imports: &[Import]) -> Self {
        let mut aliases: HashMap<String, String> = HashMap::new();
        let mut alias_conflicts = HashSet::new();
        let mut short_bindings: HashMap<String, (String, String)> = HashMap::new();
        let mut short_conflicts = HashSet::new();

        let mut bind_short = |name: String, library: String, function: String| {
            if let Some(existing) = short_bindings.get(&name) {
                if existing != &(library.clone(), function.clone()) {
                    short_conflicts.insert(name);
                }
            } else {
                short_bindings.insert(name, (library, function));
            }
        };

        for import in imports {
            match import {
                Import::Alias { library, alias } => {
                    if let Some(existing) = aliases.get(alias) {
                        if existing != library {
                            alias_conflicts.insert(alias.clone());
                        }
                    } else {
                        aliases.insert(alias.clone(), library.clone());
                    }
                }
                Import::Wildcard { library } => {
                    // Expansion needs registry membership; deferred to
                    // `build_with_registry` when one is available. A
                    // bare `build` (no registry) treats a wildcard as
                    // contributing no short bindings of its own yet.
                    let _ = library;
                }
                Import::Single { library, function } => {
                    bind_short(function.clone(), library.clone(), function.clone());
                }
            }
        }

        Self { aliases, alias_conflicts, short_bindings, short_conflicts }
    }

    /// Build a table, expanding `import lib.*` wildcards against `registry`
    /// so every function the library currently holds becomes a short
    /// binding (spec §4.2 resolution step 3).
    pub fn build_with_registry(imports: &[Import], registry: &FunctionRegistry) -> Self {
        let mut table = Self::build(imports);
        for import in imports {
            if let Import::Wildcard { library } = import {
                if let Some(lib) = registry.library(library) {
                    for (name, _) in lib.iter() {
                        let name = name.to_string();
                        if let Some(existing) = table.short_bindings.get(&name) {
                            if existing.0 != *library {
                                table.short_conflicts.insert(name);
                            }
                        } else {
                            table.short_bindings.insert(name, (library.clone(), name.clone()));
                        }
                    }
                }
            }
        }
        table
    }

    /// Whether this table recorded any duplicate-import conflict (spec
    /// §4.2: "the compiler records the conflict but does not fail at
    /// parse"). The policy compiler (§4.6) uses this to poison a document
    /// at compile time rather than waiting for a call site to hit it.
    pub fn has_conflicts(&self) -> bool {
        !self.alias_conflicts.is_empty() || !self.short_conflicts.is_empty()
    }

    /// Resolve a call name against this table and `registry`, per spec
    /// §4.2's four-step order: alias, full-qualified, wildcard, single.
    pub fn resolve<'a>(
        &self,
        name: &str,
        registry: &'a FunctionRegistry,
    ) -> Result<&'a Function, EvalError> {
        if let Some((prefix, fn_name)) = name.rsplit_once('.') {
            if self.alias_conflicts.contains(prefix) {
                return Err(EvalError::ImportConflict(format!("ambiguous alias `{prefix}`")));
            }
            if let Some(library) = self.aliases.get(prefix) {
                return registry
                    .resolve_qualified(library, fn_name)
                    .ok_or_else(|| EvalError::UnboundReference(name.to_string()));
            }
            return registry
                .resolve_qualified(prefix, fn_name)
                .ok_or_else(|| EvalError::UnboundReference(name.to_string()));
        }

        if self.short_conflicts.contains(name) {
            return Err(EvalError::ImportConflict(format!("ambiguous import `{name}`")));
        }
        let (library, function) =
            self.short_bindings.get(name).ok_or_else(|| EvalError::UnboundReference(name.to_string()))?;
        registry.resolve_qualified(library, function).ok_or_else(|| EvalError::UnboundReference(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Function, Library};

    fn registry() -> FunctionRegistry {
        let mut reg = FunctionRegistry::new();
        reg.register(
            Library::new("simple")
                .with_function(Function::new("identity", 1, |a| a[0].clone()))
                .with_function(Function::new("length", 1, |a| a[0].clone())),
        );
        reg.register(Library::new("other").with_function(Function::new("identity", 1, |a| a[0].clone())));
        reg
    }

    #[test]
    fn full_qualified_names_resolve_without_any_import() {
        let reg = registry();
        let table = ImportTable::build(&[]);
        assert!(table.resolve("simple.identity", &reg).is_ok());
    }

    #[test]
    fn alias_resolves_to_its_library() {
        let reg = registry();
        let table = ImportTable::build(&[Import::Alias { library: "simple".into(), alias: "s".into() }]);
        assert!(table.resolve("s.identity", &reg).is_ok());
    }

    #[test]
    fn wildcard_exposes_short_names() {
        let reg = registry();
        let table =
            ImportTable::build_with_registry(&[Import::Wildcard { library: "simple".into() }], &reg);
        assert!(table.resolve("identity", &reg).is_ok());
    }

    #[test]
    fn duplicate_short_import_is_a_conflict_not_a_build_failure() {
        let reg = registry();
        let imports = vec![
            Import::Single { library: "simple".into(), function: "identity".into() },
            Import::Single { library: "other".into(), function: "identity".into() },
        ];
        let table = ImportTable::build(&imports);
        assert!(matches!(table.resolve("identity", &reg), Err(EvalError::ImportConflict(_))));
    }

    #[test]
    fn unbound_short_name_is_an_error() {
        let reg = registry();
        let table = ImportTable::build(&[]);
        assert!(matches!(table.resolve("identity", &reg), Err(EvalError::UnboundReference(_))));
    }
}
