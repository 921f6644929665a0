//! The attribute-finder collaborator: external evaluation of one attribute.

use async_trait::async_trait;
use pdp_core::{EvalError, Value};

/// An external source of attribute values, registered by fully-qualified
/// name (spec §4.3: "attribute-finder registration mirrors §4.2").
///
/// A station drives a finder by repeatedly calling [`fetch`]: for a
/// poll-driven finder the station sleeps `pollInterval` between calls; a
/// push-driven finder is expected to internally await its next upstream
/// event inside `fetch` and return as soon as it has one, so the station
/// calls it again immediately.
#[async_trait]
pub trait AttributeFinder: Send + Sync {
    /// Produce the next value for `entity`/`args`, closing over `variables`
    /// — the snapshot of set-level/local variable bindings in scope at the
    /// invocation site (spec §3's "relevant-variables-snapshot", §4.2.1:
    /// the broker invokes a finder with `(entity-or-undefined, arguments,
    /// variables-snapshot)`). Returning `Err` counts as an upstream failure
    /// subject to the station's backoff/retry policy; it is distinct from
    /// the finder *successfully* returning `Value::Error(...)`, which is
    /// delivered to subscribers as-is and does not trigger a retry (spec
    /// §4.3: "An Error emitted by a finder ... does not tear down the
    /// station unless it was terminal").
    async fn fetch(&self, entity: &Value, args: &[Value], variables: &[(String, Value)]) -> Result<Value, EvalError>;

    /// Whether this finder drives its own cadence (true) or should be
    /// re-invoked on the station's `pollInterval` (false, the default).
    fn is_push_driven(&self) -> bool {
        false
    }
}

/// A finder that always returns the same value immediately; useful for
/// tests and for modelling attributes with no real upstream.
pub struct ConstantFinder(pub Value);

#[async_trait]
impl AttributeFinder for ConstantFinder {
    async fn fetch(&self, _entity: &Value, _args: &[Value], _variables: &[(String, Value)]) -> Result<Value, EvalError> {
        Ok(self.0.clone())
    }
}
