//! Libraries, functions, and the registry they're collected under.

use pdp_core::{EvalError, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A single registered function: a fixed arity and a pure `Value` handler.
///
/// Functions are pure by contract (spec §4.2: "same inputs -> same
/// output"); the broker does not enforce purity, it only provides the
/// arity/type-mismatch guard rails every handler can rely on.
#[derive(Clone)]
pub struct Function {
    name: String,
    arity: usize,
    handler: Arc<dyn Fn(&[Value]) -> Value + Send + Sync>,
}

impl Function {
    /// Register a new function under `name`, accepting exactly `arity`
    /// arguments.
    pub fn new(
        name: impl Into<String>,
        arity: usize,
        handler: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self { name: name.into(), arity, handler: Arc::new(handler) }
    }

    /// This function's registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the function against an already-evaluated argument list.
    /// An arity mismatch short-circuits to `Error` without calling the
    /// handler (spec §4.2: "type mismatch yields `Error`"; arity mismatch
    /// is this implementation's analogous guard, since spec.md's grammar
    /// is fixed-arity per function).
    pub fn call(&self, args: &[Value]) -> Value {
        if args.len() != self.arity {
            return Value::error(EvalError::ArityMismatch(format!(
                "{} expects {} argument(s), got {}",
                self.name,
                self.arity,
                args.len()
            )));
        }
        (self.handler)(args)
    }
}

/// A named collection of functions (spec §4.2: "a named set of functions").
#[derive(Clone, Default)]
pub struct Library {
    name: String,
    functions: HashMap<String, Function>,
}

impl Library {
    /// Start an empty library named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), functions: HashMap::new() }
    }

    /// This library's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register `f` under its own name within this library.
    pub fn with_function(mut self, f: Function) -> Self {
        self.functions.insert(f.name().to_string(), f);
        self
    }

    /// Look up a function by short name within this library.
    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// All `(name, function)` pairs, for wildcard-import expansion.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Function)> {
        self.functions.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// The top-level set of registered libraries a [`crate::ImportTable`]
/// resolves against.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    libraries: HashMap<String, Arc<Library>>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a library, replacing any previous library of the same name.
    pub fn register(&mut self, library: Library) {
        self.libraries.insert(library.name().to_string(), Arc::new(library));
    }

    /// Look up a library by name.
    pub fn library(&self, name: &str) -> Option<&Arc<Library>> {
        self.libraries.get(name)
    }

    /// Resolve a full-qualified `lib.fn` call directly, bypassing imports
    /// entirely (spec §4.2 resolution step 2: a full-qualified name is
    /// always reachable).
    pub fn resolve_qualified(&self, library: &str, function: &str) -> Option<&Function> {
        self.libraries.get(library).and_then(|l| l.get(function))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_mismatch_is_an_error_not_a_panic() {
        let f = Function::new("id", 1, |args| args[0].clone());
        let v = f.call(&[]);
        assert!(v.is_error());
    }

    #[test]
    fn registry_resolves_qualified_names() {
        let mut reg = FunctionRegistry::new();
        reg.register(Library::new("simple").with_function(Function::new("identity", 1, |a| a[0].clone())));
        assert!(reg.resolve_qualified("simple", "identity").is_some());
        assert!(reg.resolve_qualified("simple", "nope").is_none());
        assert!(reg.resolve_qualified("nope", "identity").is_none());
    }
}
