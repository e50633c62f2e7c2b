//! Wallet composition: keys, owned outputs, transfers, encrypted files.
//!
//! The [`Wallet`] tracks the outputs it owns by scanning a UTXO listing. It
//! never treats its own view as authoritative; the ledger decides what is
//! spendable.

use std::collections::BTreeMap;
use std::path::Path;

use san_core::address::{Address, Network};
use san_core::policy::COIN;
use san_core::types::{OutPoint, Transaction, Utxo};

use crate::builder::TransactionBuilder;
use crate::encryption;
use crate::error::WalletError;
use crate::keys::{KeyChain, KeyChainData, Seed};
use crate::mnemonic;

/// Magic bytes identifying a Sancoin wallet file.
pub const WALLET_MAGIC: &[u8; 4] = b"SANW";

/// Current wallet file format version.
pub const WALLET_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalletBalance {
    /// Sum of every owned output.
    pub total: u64,
    /// Portion of `total` spendable at the queried height.
    pub spendable: u64,
    pub utxo_count: usize,
}

impl WalletBalance {
    /// Total in whole coins (display only).
    pub fn total_coins(&self) -> f64 {
        self.total as f64 / COIN as f64
    }
}

/// Wallet file header serialized as JSON.
#[derive(serde::Serialize, serde::Deserialize)]
struct WalletFileHeader {
    magic: String,
    version: u32,
}

pub struct Wallet {
    keychain: KeyChain,
    utxos: BTreeMap<OutPoint, Utxo>,
}

impl Wallet {
    /// A wallet with a fresh random seed.
    pub fn create(network: Network) -> Self {
        Self::from_seed(Seed::generate(), network)
    }

    pub fn from_seed(seed: Seed, network: Network) -> Self {
        Self {
            keychain: KeyChain::new(seed, network),
            utxos: BTreeMap::new(),
        }
    }

    /// Restore from a 24-word backup phrase.
    pub fn from_mnemonic(phrase: &str, network: Network) -> Result<Self, WalletError> {
        Ok(Self::from_seed(mnemonic::mnemonic_to_seed(phrase)?, network))
    }

    /// The seed as a 24-word backup phrase.
    pub fn mnemonic(&self) -> Result<String, WalletError> {
        mnemonic::seed_to_mnemonic(self.keychain.seed())
    }

    /// Derive the next receive address.
    pub fn next_address(&mut self) -> Address {
        self.keychain.next_address()
    }

    pub fn network(&self) -> Network {
        self.keychain.network()
    }

    /// Number of derived addresses.
    pub fn address_count(&self) -> u32 {
        self.keychain.next_index()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.keychain.addresses()
    }

    /// Replace the owned-output view with the matching entries of `utxos`.
    pub fn scan_utxos<'a>(&mut self, utxos: impl IntoIterator<Item = &'a Utxo>) {
        self.utxos = utxos
            .into_iter()
            .filter(|u| self.keychain.owns(u.address()))
            .map(|u| (u.outpoint, u.clone()))
            .collect();
        tracing::debug!(owned = self.utxos.len(), "wallet scan complete");
    }

    /// Balance of the owned-output view. Coinbase outputs count as spendable
    /// once `height - created >= coinbase_maturity`.
    pub fn balance(&self, height: u64, coinbase_maturity: u64) -> WalletBalance {
        self.utxos.values().fold(WalletBalance::default(), |acc, u| WalletBalance {
            total: acc.total.saturating_add(u.amount()),
            spendable: if u.is_mature(height, coinbase_maturity) {
                acc.spendable.saturating_add(u.amount())
            } else {
                acc.spendable
            },
            utxo_count: acc.utxo_count + 1,
        })
    }

    pub fn utxo_count(&self) -> usize {
        self.utxos.len()
    }

    pub fn owned_utxos(&self) -> Vec<Utxo> {
        self.utxos.values().cloned().collect()
    }

    pub fn keychain(&self) -> &KeyChain {
        &self.keychain
    }

    /// Build and sign a transfer from mature outputs.
    ///
    /// Change goes to a freshly derived address. Spent outputs leave the
    /// owned view immediately so a second call does not reuse them.
    pub fn send(
        &mut self,
        recipients: &[(Address, u64)],
        height: u64,
        coinbase_maturity: u64,
        timestamp: u64,
    ) -> Result<Transaction, WalletError> {
        if recipients.is_empty() {
            return Err(WalletError::BuildError("no recipients".into()));
        }
        let spendable: Vec<Utxo> = self
            .utxos
            .values()
            .filter(|u| u.is_mature(height, coinbase_maturity))
            .cloned()
            .collect();
        if spendable.is_empty() {
            return Err(WalletError::NoUtxos);
        }

        // The change key is only claimed once the transfer is built and signed.
        let change = self.keychain.peek_next_address();
        let mut builder = TransactionBuilder::new();
        for (addr, amount) in recipients {
            builder.add_recipient(*addr, *amount);
        }
        let unsigned = builder.build(&spendable, &change, timestamp)?;
        let spent: Vec<OutPoint> = unsigned.selection.selected.iter().map(|u| u.outpoint).collect();
        let tx = TransactionBuilder::sign(unsigned, &self.keychain)?;
        self.keychain.next_address();

        for op in &spent {
            self.utxos.remove(op);
        }
        tracing::info!(tx = %tx.hash(), inputs = spent.len(), "wallet built transfer");
        Ok(tx)
    }

    /// Save the keychain to an encrypted file.
    ///
    /// # File format
    /// ```text
    /// header_len (4 bytes LE) || header_json || encrypted_payload
    /// ```
    /// The header is plaintext JSON with magic and version. The payload is
    /// the encrypted keychain data.
    pub fn save_to_file(&self, path: &Path, password: &[u8]) -> Result<(), WalletError> {
        let header = WalletFileHeader {
            magic: String::from_utf8_lossy(WALLET_MAGIC).to_string(),
            version: WALLET_VERSION,
        };
        let header_json =
            serde_json::to_vec(&header).map_err(|e| WalletError::Serialization(e.to_string()))?;

        let data = KeyChainData::from_keychain(&self.keychain);
        let payload = zeroize::Zeroizing::new(
            serde_json::to_vec(&data).map_err(|e| WalletError::Serialization(e.to_string()))?,
        );
        let encrypted = encryption::encrypt(&payload, password)?;

        let header_len = u32::try_from(header_json.len())
            .map_err(|_| WalletError::Serialization("header too large".into()))?;
        let mut file_data = Vec::with_capacity(4 + header_json.len() + encrypted.len());
        file_data.extend_from_slice(&header_len.to_le_bytes());
        file_data.extend_from_slice(&header_json);
        file_data.extend_from_slice(&encrypted);

        std::fs::write(path, &file_data).map_err(|e| WalletError::IoError(e.to_string()))?;
        tracing::debug!(path = %path.display(), "wallet saved");
        Ok(())
    }

    /// Load a wallet saved by [`save_to_file`](Self::save_to_file).
    pub fn load_from_file(path: &Path, password: &[u8]) -> Result<Self, WalletError> {
        let file_data = std::fs::read(path).map_err(|e| WalletError::IoError(e.to_string()))?;

        let Some((len_bytes, rest)) = file_data.split_first_chunk::<4>() else {
            return Err(WalletError::CorruptedFile("file too short".into()));
        };
        let header_len = u32::from_le_bytes(*len_bytes) as usize;
        if rest.len() < header_len {
            return Err(WalletError::CorruptedFile("header truncated".into()));
        }
        let (header_json, encrypted) = rest.split_at(header_len);

        let header: WalletFileHeader = serde_json::from_slice(header_json)
            .map_err(|e| WalletError::CorruptedFile(format!("invalid header: {e}")))?;
        if header.magic.as_bytes() != WALLET_MAGIC {
            return Err(WalletError::CorruptedFile("invalid magic bytes".into()));
        }
        if header.version != WALLET_VERSION {
            return Err(WalletError::CorruptedFile(format!(
                "unsupported version: {}",
                header.version
            )));
        }

        let payload = zeroize::Zeroizing::new(encryption::decrypt(encrypted, password)?);
        let data: KeyChainData = serde_json::from_slice(&payload)
            .map_err(|e| WalletError::CorruptedFile(format!("invalid payload: {e}")))?;

        Ok(Self {
            keychain: data.to_keychain(),
            utxos: BTreeMap::new(),
        })
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("network", &self.keychain.network())
            .field("addresses", &self.keychain.next_index())
            .field("utxos", &self.utxos.len())
            .finish()
    }
}
