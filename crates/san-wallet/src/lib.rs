//! # san-wallet: deterministic wallet for the Sancoin ledger.
//!
//! Derives Ed25519 keys from a master seed, selects coins largest-first,
//! builds and signs transfers, and stores the seed in an encrypted file.
//!
//! # Modules
//!
//! - [`error`]: `WalletError` enum
//! - [`keys`]: Seed, KeyChain, BLAKE3-based key derivation
//! - [`mnemonic`]: BIP-39 backup phrases
//! - [`coin_selection`]: Largest-first UTXO selection
//! - [`encryption`]: AES-256-GCM with an Argon2id key
//! - [`builder`]: Transfer builder with signing
//! - [`wallet`]: High-level wallet composition

pub mod builder;
pub mod coin_selection;
pub mod encryption;
pub mod error;
pub mod keys;
pub mod mnemonic;
pub mod wallet;

pub use builder::{Recipient, TransactionBuilder, UnsignedTransfer};
pub use coin_selection::{CoinSelection, CoinSelector};
pub use encryption::{decrypt, encrypt};
pub use error::WalletError;
pub use keys::{KeyChain, KeyChainData, Seed};
pub use wallet::{Wallet, WalletBalance};
