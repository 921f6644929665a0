//! Structured (JSON) logging init shared across the PDP crates.

#![deny(unsafe_code)]

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Errors from telemetry setup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The global subscriber was already set by someone else.
    #[error("global tracing subscriber already set")]
    AlreadySet,
}

/// Initialize JSON-structured logging with an env filter.
///
/// Set `RUST_LOG`, e.g. `"info,pdp_eval=debug"`. Safe to call more than
/// once; later calls are no-ops (the first subscriber wins).
pub fn init_json_logging() {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Initialize JSON-structured logging, reporting whether this call won the
/// race to install the global subscriber.
pub fn try_init_json_logging() -> Result<(), TelemetryError> {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(|_| TelemetryError::AlreadySet)
}
