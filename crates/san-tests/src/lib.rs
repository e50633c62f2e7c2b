//! Cross-crate test suite for Sancoin.
//!
//! Scenario, property, and concurrency tests live under `tests/`. They drive
//! the ledger service the way a node would and check the ledger invariants
//! hold: no output is spent twice, value is conserved, and balances always
//! agree with the UTXO set.

pub mod helpers;
