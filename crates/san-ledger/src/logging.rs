//! Tracing subscriber setup for processes hosting a ledger.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::config::LogFormat;
use crate::error::LedgerServiceError;

/// Filter from `RUST_LOG` if set, else from `level`.
pub fn build_filter(level: &str) -> Result<EnvFilter, LedgerServiceError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| LedgerServiceError::Logging(format!("bad filter '{level}': {e}"))),
    }
}

/// Install the global subscriber.
///
/// `LogFormat::Json` emits one JSON object per event for log pipelines.
/// Fails if a global subscriber is already installed.
pub fn init_logging(level: &str, format: LogFormat) -> Result<(), LedgerServiceError> {
    let filter = build_filter(level)?;
    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .try_init(),
    };
    result.map_err(|e| LedgerServiceError::Logging(e.to_string()))
}
