//! # san-ledger
//!
//! Service layer over `san-core`: the [`Ledger`] composes the UTXO set, chain
//! tip, mempool, persistence, and balance cache behind locks so callers can
//! validate, admit, and commit concurrently. Also hosts configuration loading
//! and logging setup for binaries.

pub mod balance_cache;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;

pub use balance_cache::BalanceCache;
pub use crate::config::{LedgerConfig, LogFormat};
pub use error::LedgerServiceError;
pub use ledger::{unix_now, BlockConnected, Ledger};
pub use logging::init_logging;
