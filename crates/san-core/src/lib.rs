//! # san-core
//! UTXO set, transaction validation, mempool, and block rules for the Sancoin
//! ledger. Everything here is in-memory and synchronous; persistence and
//! locking belong to the caller.

pub mod address;
pub mod block;
pub mod chain_store;
pub mod crypto;
pub mod error;
pub mod mempool;
pub mod merkle;
pub mod policy;
pub mod raw;
pub mod traits;
pub mod types;
pub mod utxo_set;
pub mod validation;
