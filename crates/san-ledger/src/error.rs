//! Errors surfaced by the ledger service.
use thiserror::Error;

use san_core::error::{ChainError, ConflictError, LedgerError, SanError, ValidationError};

#[derive(Error, Debug)]
pub enum LedgerServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Persistence collaborator failure.
    #[error(transparent)]
    Store(#[from] SanError),
    #[error("config: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("logging: {0}")]
    Logging(String),
    /// Persisted and in-memory state disagree. Not recoverable in-process.
    #[error("ledger state inconsistent: {0}")]
    Inconsistent(String),
}

impl LedgerServiceError {
    /// Whether the caller submitted something the ledger refused, as opposed
    /// to an internal or environmental failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Conflict(_) | Self::Chain(_) | Self::Ledger(_)
        )
    }
}
