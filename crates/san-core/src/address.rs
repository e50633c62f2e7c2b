//! Base58Check addresses.
//!
//! An address is `Base58(version || RIPEMD160(SHA256(pubkey)) || checksum)`,
//! where the checksum is the first four bytes of a double SHA-256 over
//! `version || hash`.

use ripemd::Ripemd160;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::crypto::PublicKey;
use crate::error::AddressError;
use crate::types::Hash160;

/// Decoded payload length: version byte, 20-byte hash, 4-byte checksum.
const DECODED_LEN: usize = 1 + 20 + 4;

/// Network an address belongs to, selecting its version byte.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Version byte `0x00`; addresses start with `1`.
    Mainnet,
    /// Version byte `0x6f`; used by testnet and regtest.
    Testnet,
}

impl Network {
    pub fn version_byte(&self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet => 0x6f,
        }
    }

    pub fn from_version_byte(byte: u8) -> Result<Self, AddressError> {
        match byte {
            0x00 => Ok(Network::Mainnet),
            0x6f => Ok(Network::Testnet),
            other => Err(AddressError::InvalidVersion(other)),
        }
    }
}

/// `RIPEMD160(SHA256(data))`.
pub fn hash160(data: &[u8]) -> Hash160 {
    let sha = Sha256::digest(data);
    Hash160(Ripemd160::digest(sha).into())
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(Sha256::digest(payload));
    [digest[0], digest[1], digest[2], digest[3]]
}

/// A ledger address: network plus the owner's key hash.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct Address {
    network: Network,
    hash: Hash160,
}

impl Address {
    pub fn from_hash160(hash: Hash160, network: Network) -> Self {
        Self { network, hash }
    }

    /// Derive the address owned by `public_key`.
    pub fn from_public_key(public_key: &PublicKey, network: Network) -> Self {
        Self::from_hash160(public_key.hash160(), network)
    }

    pub fn hash160(&self) -> &Hash160 {
        &self.hash
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Encode as a Base58Check string.
    pub fn encode(&self) -> String {
        let mut payload = Vec::with_capacity(DECODED_LEN);
        payload.push(self.network.version_byte());
        payload.extend_from_slice(self.hash.as_bytes());
        let check = checksum(&payload);
        payload.extend_from_slice(&check);
        bs58::encode(payload).into_string()
    }

    /// Decode a Base58Check string, verifying length, checksum, and version.
    pub fn decode(s: &str) -> Result<Self, AddressError> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| AddressError::InvalidBase58(e.to_string()))?;
        if bytes.len() != DECODED_LEN {
            return Err(AddressError::InvalidLength(bytes.len()));
        }
        let (payload, check) = bytes.split_at(DECODED_LEN - 4);
        if checksum(payload)[..] != check[..] {
            return Err(AddressError::InvalidChecksum);
        }
        let network = Network::from_version_byte(payload[0])?;
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);
        Ok(Self::from_hash160(Hash160(hash), network))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::decode(&s).map_err(serde::de::Error::custom)
    }
}
