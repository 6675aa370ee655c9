//! Structured logging init for the largeBlobArray engine.
//!
//! `spec.md` names logging as an out-of-scope external collaborator; the
//! ambient stack still wires it up the way the rest of this workspace's
//! sibling crates do, with JSON output and an env filter, so the spans
//! emitted around fetch/write/auth (see `largeblob-transport`,
//! `largeblob-auth`) land somewhere.

#![deny(unsafe_code)]

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Errors from telemetry setup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The global `tracing` subscriber was already set by someone else.
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,
}

/// Initialize JSON-formatted structured logging with an env filter.
///
/// Set `RUST_LOG`, e.g. `"info,largeblob_transport=debug"`. Defaults to
/// `info` when unset or unparsable.
///
/// # Errors
/// Returns [`TelemetryError::AlreadyInitialized`] if a global subscriber is
/// already installed.
pub fn init_json_logging() -> Result<(), TelemetryError> {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|_| TelemetryError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_already_initialized() {
        let _ = init_json_logging();
        assert!(matches!(init_json_logging(), Err(TelemetryError::AlreadyInitialized)));
    }
}
