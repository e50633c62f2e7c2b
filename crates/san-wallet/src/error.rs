//! Wallet error types.

use san_core::error::{AddressError, CryptoError};
use thiserror::Error;

/// Errors that can occur in wallet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Selected outputs cannot cover the amount plus fee.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Available value in sats.
        have: u64,
        /// Required value in sats.
        need: u64,
    },

    #[error("no UTXOs available")]
    NoUtxos,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("encryption: {0}")]
    Encryption(String),

    /// Wrong password, or the ciphertext was tampered with.
    #[error("invalid password")]
    InvalidPassword,

    #[error("corrupted file: {0}")]
    CorruptedFile(String),

    #[error("I/O error: {0}")]
    IoError(String),

    /// No derived key owns the output being spent.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("build error: {0}")]
    BuildError(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("serialization: {0}")]
    Serialization(String),

    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),
}
