//! Error types for the Sancoin ledger core.
use thiserror::Error;

use crate::types::{Hash256, OutPoint};

/// Why a transaction was rejected by [`validate_transaction`](crate::validation::validate_transaction).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("hash mismatch: claimed {claimed}, computed {computed}")] HashMismatch { claimed: Hash256, computed: Hash256 },
    #[error("invalid signature on input {index}")] InvalidSignature { index: usize },
    #[error("unknown input: {0}")] UnknownInput(OutPoint),
    #[error("duplicate input: {0}")] DuplicateInput(OutPoint),
    #[error("insufficient funds: have {have}, need {need}")] InsufficientFunds { have: u64, need: u64 },
    #[error("fee too low: {fee} < {minimum}")] FeeTooLow { fee: u64, minimum: u64 },
    #[error("invalid coinbase: {0}")] InvalidCoinbase(String),
    #[error("immature coinbase output at input {index}")] ImmatureCoinbase { index: usize },
    #[error("zero-value output at index {0}")] ZeroValueOutput(usize),
    #[error("locking script does not match address at output {0}")] LockingScriptMismatch(usize),
    #[error("transaction has no outputs")] EmptyOutputs,
    #[error("transfer has no inputs")] EmptyInputs,
    #[error("amount overflow")] AmountOverflow,
    #[error("malformed transaction: {0}")] Malformed(String),
}

/// Failures applying changes to the UTXO set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("double spend: {0} already spent")] DoubleSpend(OutPoint),
    #[error("unknown input: {0} never existed")] UnknownInput(OutPoint),
    #[error("amount overflow")] AmountOverflow,
}

/// Mempool admission failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("outpoint {outpoint} already claimed by pool tx {existing}")] DoubleSpendInMempool { outpoint: OutPoint, existing: Hash256 },
    #[error("transaction already in pool: {0}")] AlreadyExists(Hash256),
    #[error("input {0} is neither unspent nor created by a pool transaction")] UnknownInput(OutPoint),
    #[error("pool full")] PoolFull,
}

/// Block linkage, structure, and application failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("fork or stale block: expected parent {expected}, got {got}")] ForkOrStale { expected: Hash256, got: Hash256 },
    #[error("height mismatch: expected {expected}, got {got}")] HeightMismatch { expected: u64, got: u64 },
    #[error("merkle root mismatch: header {header}, computed {computed}")] MerkleMismatch { header: Hash256, computed: Hash256 },
    #[error("no coinbase")] NoCoinbase,
    #[error("first transaction is not coinbase")] FirstTxNotCoinbase,
    #[error("multiple coinbase transactions")] MultipleCoinbase,
    #[error("duplicate transaction: {0}")] DuplicateTxid(Hash256),
    #[error("double spend within block: {0}")] DoubleSpend(OutPoint),
    #[error("insufficient proof of work")] InvalidProofOfWork,
    #[error("invalid difficulty: got {got}, expected {expected}")] InvalidDifficulty { got: u32, expected: u32 },
    #[error("tx error in {index}: {source}")] Transaction { index: usize, source: ValidationError },
    #[error(transparent)] Ledger(#[from] LedgerError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key material")] InvalidKeyMaterial,
    #[error("invalid signature bytes")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
    #[error("public key does not own the spent output")] OwnerMismatch,
    #[error("input index out of bounds: {index} >= {len}")] InputIndexOutOfBounds { index: usize, len: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58: {0}")] InvalidBase58(String),
    #[error("invalid length: {0}")] InvalidLength(usize),
    #[error("invalid checksum")] InvalidChecksum,
    #[error("invalid version: {0}")] InvalidVersion(u8),
}

#[derive(Error, Debug)]
pub enum SanError {
    #[error(transparent)] Validation(#[from] ValidationError),
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Conflict(#[from] ConflictError),
    #[error(transparent)] Chain(#[from] ChainError),
    #[error(transparent)] Crypto(#[from] CryptoError),
    #[error(transparent)] Address(#[from] AddressError),
    #[error("storage: {0}")] Storage(String),
}
