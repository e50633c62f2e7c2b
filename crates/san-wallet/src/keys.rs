//! Seed management and deterministic key derivation.
//!
//! Child Ed25519 keys come from BLAKE3 `derive_key` over `seed || index`, so
//! every key can be recovered from the 32-byte seed alone.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use san_core::address::{Address, Network};
use san_core::crypto::KeyPair;
use san_core::types::Hash160;

/// BLAKE3 KDF context for child key derivation.
const KDF_CONTEXT: &str = "sancoin-wallet-key-derivation-v1";

/// A 32-byte master seed. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; 32],
}

impl Seed {
    /// Generate a random seed from the OS RNG.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl Clone for Seed {
    fn clone(&self) -> Self {
        Self { bytes: self.bytes }
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Deterministic key chain rooted at a seed.
///
/// Derived keypairs are cached by index, with a reverse lookup from the
/// key's hash160 so the owner of an output can be found when signing.
pub struct KeyChain {
    seed: Seed,
    network: Network,
    next_index: u32,
    keypairs: HashMap<u32, KeyPair>,
    index_by_hash: HashMap<Hash160, u32>,
}

impl KeyChain {
    pub fn new(seed: Seed, network: Network) -> Self {
        Self {
            seed,
            network,
            next_index: 0,
            keypairs: HashMap::new(),
            index_by_hash: HashMap::new(),
        }
    }

    /// Derive (or fetch from cache) the keypair at `index`.
    pub fn derive_keypair(&mut self, index: u32) -> &KeyPair {
        let seed = &self.seed;
        let index_by_hash = &mut self.index_by_hash;
        self.keypairs.entry(index).or_insert_with(|| {
            let kp = derive_child_keypair(seed, index);
            index_by_hash.insert(kp.public_key().hash160(), index);
            kp
        })
    }

    /// Derive the next keypair, advancing the index.
    pub fn next_keypair(&mut self) -> &KeyPair {
        let index = self.next_index;
        self.next_index = self.next_index.saturating_add(1);
        self.derive_keypair(index)
    }

    pub fn address_at(&mut self, index: u32) -> Address {
        let network = self.network;
        self.derive_keypair(index).address(network)
    }

    /// The address [`next_address`](Self::next_address) would return, without
    /// deriving or storing anything.
    pub fn peek_next_address(&self) -> Address {
        derive_child_keypair(&self.seed, self.next_index).address(self.network)
    }

    /// Derive the next address, advancing the index.
    pub fn next_address(&mut self) -> Address {
        let network = self.network;
        self.next_keypair().address(network)
    }

    /// The derived keypair whose public key hashes to `hash`.
    pub fn keypair_for_hash(&self, hash: &Hash160) -> Option<&KeyPair> {
        self.index_by_hash
            .get(hash)
            .and_then(|idx| self.keypairs.get(idx))
    }

    /// Re-derive keys `0..n` after loading from a file.
    pub fn restore_to_index(&mut self, n: u32) {
        for i in 0..n {
            self.derive_keypair(i);
        }
        self.next_index = n;
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    pub(crate) fn seed(&self) -> &Seed {
        &self.seed
    }

    /// Addresses of every derived key.
    pub fn addresses(&self) -> Vec<Address> {
        let mut indexed: Vec<(u32, Address)> = self
            .keypairs
            .iter()
            .map(|(i, kp)| (*i, kp.address(self.network)))
            .collect();
        indexed.sort_by_key(|(i, _)| *i);
        indexed.into_iter().map(|(_, a)| a).collect()
    }

    pub fn owns(&self, address: &Address) -> bool {
        address.network() == self.network && self.index_by_hash.contains_key(address.hash160())
    }
}

impl fmt::Debug for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyChain")
            .field("network", &self.network)
            .field("next_index", &self.next_index)
            .field("cached_keys", &self.keypairs.len())
            .finish()
    }
}

/// Serializable keychain state, stored encrypted in the wallet file.
#[derive(Serialize, Deserialize, Clone)]
pub struct KeyChainData {
    pub seed: [u8; 32],
    pub network: Network,
    pub next_index: u32,
}

impl KeyChainData {
    pub fn from_keychain(keychain: &KeyChain) -> Self {
        Self {
            seed: *keychain.seed().as_bytes(),
            network: keychain.network(),
            next_index: keychain.next_index(),
        }
    }

    pub fn to_keychain(&self) -> KeyChain {
        let mut keychain = KeyChain::new(Seed::from_bytes(self.seed), self.network);
        keychain.restore_to_index(self.next_index);
        keychain
    }
}

impl Drop for KeyChainData {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

fn derive_child_keypair(seed: &Seed, index: u32) -> KeyPair {
    let mut ikm = Vec::with_capacity(36);
    ikm.extend_from_slice(seed.as_bytes());
    ikm.extend_from_slice(&index.to_le_bytes());
    let derived = blake3::derive_key(KDF_CONTEXT, &ikm);
    ikm.zeroize();
    KeyPair::from_secret_bytes(derived)
}
