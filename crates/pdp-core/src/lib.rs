//! Shared primitives for the policy decision point: the JSON-like value
//! model (C1), the authorization subscription/decision records, the error
//! taxonomy propagated through evaluation, and PDP-wide configuration.

#![deny(unsafe_code)]

pub mod config;
pub mod decision;
pub mod error;
pub mod ids;
pub mod subscription;
pub mod value;

pub use config::{AttributeTiming, PdpConfig};
pub use decision::{AuthorizationDecision, Decision};
pub use error::EvalError;
pub use subscription::Subscription;
pub use value::Value;
