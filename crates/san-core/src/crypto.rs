//! Ed25519 keys, signatures, and per-input transaction signing.
//!
//! # Signing scheme
//!
//! Each transfer input signs a 68-byte message:
//!
//! ```text
//! tx_hash[32] || prev_tx_hash[32] || output_index: u32 LE
//! ```
//!
//! Binding the referenced outpoint into the message means a signature made for
//! one input cannot be replayed on another input of the same transaction.

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::address::{self, Address, Network};
use crate::error::CryptoError;
use crate::types::{Hash160, Hash256, OutPoint, TransferTx, TxInput};

/// Length of an Ed25519 secret key.
pub const SECRET_KEY_LEN: usize = 32;
/// Length of an Ed25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Length of an Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;
/// Length of a per-input signing message.
pub const INPUT_MESSAGE_LEN: usize = 32 + 32 + 4;

/// Ed25519 keypair.
///
/// The secret is zeroized on drop by `ed25519-dalek`.
pub struct KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Generate a random keypair from the OS RNG.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    pub fn from_secret_bytes(bytes: [u8; SECRET_KEY_LEN]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&bytes),
        }
    }

    /// Parse a secret key of unchecked length.
    pub fn from_secret_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret: [u8; SECRET_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyMaterial)?;
        Ok(Self::from_secret_bytes(secret))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// Raw secret bytes. Handle with care.
    pub fn secret_bytes(&self) -> [u8; SECRET_KEY_LEN] {
        self.signing_key.to_bytes()
    }

    pub fn address(&self, network: Network) -> Address {
        Address::from_public_key(&self.public_key(), network)
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        Self::from_secret_bytes(self.secret_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Ed25519 public key.
#[derive(Clone)]
pub struct PublicKey {
    verifying_key: ed25519_dalek::VerifyingKey,
}

impl PublicKey {
    /// Parse a 32-byte public key. Rejects wrong lengths and non-curve points.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; PUBLIC_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyMaterial)?;
        let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&raw)
            .map_err(|_| CryptoError::InvalidKeyMaterial)?;
        Ok(Self { verifying_key })
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.verifying_key.to_bytes()
    }

    /// `RIPEMD160(SHA256(pubkey))`, the hash carried in addresses.
    pub fn hash160(&self) -> Hash160 {
        address::hash160(&self.to_bytes())
    }

    /// Check a signature over `message`.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not verify and
    /// `Err(InvalidSignature)` when the signature bytes are malformed.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool, CryptoError> {
        let raw: [u8; SIGNATURE_LEN] =
            signature.try_into().map_err(|_| CryptoError::InvalidSignature)?;
        let sig = ed25519_dalek::Signature::from_bytes(&raw);
        Ok(self.verifying_key.verify(message, &sig).is_ok())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_bytes()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PublicKey {}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Derive the public key for a raw 32-byte secret.
pub fn derive_public_key(secret: &[u8]) -> Result<PublicKey, CryptoError> {
    Ok(KeyPair::from_secret_slice(secret)?.public_key())
}

/// Derive the address owned by `public_key` on `network`.
pub fn derive_address(public_key: &PublicKey, network: Network) -> Address {
    Address::from_public_key(public_key, network)
}

/// Sign `message` with a raw 32-byte secret.
pub fn sign(message: &[u8], secret: &[u8]) -> Result<[u8; SIGNATURE_LEN], CryptoError> {
    Ok(KeyPair::from_secret_slice(secret)?.sign(message))
}

/// Verify `signature` over `message` against raw public key bytes.
///
/// Malformed key or signature bytes are errors, not `false`.
pub fn verify(message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool, CryptoError> {
    PublicKey::from_bytes(public_key)?.verify(message, signature)
}

/// Message signed by the input spending `outpoint` in the transaction `tx_hash`.
pub fn input_message(tx_hash: &Hash256, outpoint: &OutPoint) -> [u8; INPUT_MESSAGE_LEN] {
    let mut msg = [0u8; INPUT_MESSAGE_LEN];
    msg[..32].copy_from_slice(tx_hash.as_bytes());
    msg[32..64].copy_from_slice(outpoint.tx_hash.as_bytes());
    msg[64..].copy_from_slice(&outpoint.index.to_le_bytes());
    msg
}

/// Sign input `input_index` of `tx` in place.
///
/// The hash excludes signature material, so inputs may be signed in any order.
pub fn sign_input(
    tx: &mut TransferTx,
    input_index: usize,
    keypair: &KeyPair,
) -> Result<(), CryptoError> {
    let len = tx.inputs.len();
    let tx_hash = tx.hash();
    let input = tx
        .inputs
        .get_mut(input_index)
        .ok_or(CryptoError::InputIndexOutOfBounds {
            index: input_index,
            len,
        })?;
    let message = input_message(&tx_hash, &input.previous_output);
    input.signature = keypair.sign(&message).to_vec();
    input.public_key = keypair.public_key().to_bytes().to_vec();
    Ok(())
}

/// Verify one input of the transaction `tx_hash` against the owner of the spent output.
///
/// 1. The public key parses and hashes to `owner`.
/// 2. The signature verifies over [`input_message`] for this input's outpoint.
pub fn verify_input(tx_hash: &Hash256, input: &TxInput, owner: &Hash160) -> Result<(), CryptoError> {
    let pk = PublicKey::from_bytes(&input.public_key)?;
    if pk.hash160() != *owner {
        return Err(CryptoError::OwnerMismatch);
    }
    let message = input_message(tx_hash, &input.previous_output);
    if pk.verify(&message, &input.signature)? {
        Ok(())
    } else {
        Err(CryptoError::VerificationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxOutput;

    fn transfer_with_inputs(n: u32) -> TransferTx {
        let to = Address::from_hash160(Hash160([9; 20]), Network::Testnet);
        TransferTx {
            inputs: (0..n)
                .map(|i| TxInput::unsigned(OutPoint::new(Hash256([0x11; 32]), i)))
                .collect(),
            outputs: vec![TxOutput::to(to, 1_000)],
            timestamp: 1_700_000_000,
        }
    }

    // --- KeyPair ---

    #[test]
    fn keypair_from_secret_deterministic() {
        let kp1 = KeyPair::from_secret_bytes([42; 32]);
        let kp2 = KeyPair::from_secret_bytes([42; 32]);
        assert_eq!(kp1.public_key(), kp2.public_key());
        assert_ne!(kp1.public_key(), KeyPair::from_secret_bytes([43; 32]).public_key());
    }

    #[test]
    fn keypair_generate_unique() {
        assert_ne!(KeyPair::generate().public_key(), KeyPair::generate().public_key());
    }

    #[test]
    fn keypair_debug_hides_secret() {
        let kp = KeyPair::generate();
        let debug = format!("{kp:?}");
        assert!(debug.contains("public_key"));
        assert!(!debug.contains(&hex::encode(kp.secret_bytes())));
    }

    // --- Free functions ---

    #[test]
    fn derive_public_key_matches_keypair() {
        let kp = KeyPair::from_secret_bytes([5; 32]);
        assert_eq!(derive_public_key(&[5; 32]).unwrap(), kp.public_key());
    }

    #[test]
    fn derive_public_key_rejects_bad_length() {
        assert_eq!(derive_public_key(&[5; 31]), Err(CryptoError::InvalidKeyMaterial));
    }

    #[test]
    fn sign_and_verify() {
        let secret = [3u8; 32];
        let pk = derive_public_key(&secret).unwrap();
        let sig = sign(b"hello", &secret).unwrap();
        assert_eq!(verify(b"hello", &sig, &pk.to_bytes()), Ok(true));
        assert_eq!(verify(b"hellp", &sig, &pk.to_bytes()), Ok(false));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let sig = sign(b"msg", &[1; 32]).unwrap();
        let other = derive_public_key(&[2; 32]).unwrap();
        assert_eq!(verify(b"msg", &sig, &other.to_bytes()), Ok(false));
    }

    #[test]
    fn verify_malformed_inputs_are_errors() {
        let pk = derive_public_key(&[1; 32]).unwrap().to_bytes();
        assert_eq!(verify(b"m", &[0; 63], &pk), Err(CryptoError::InvalidSignature));
        assert_eq!(verify(b"m", &[0; 64], &[0; 31]), Err(CryptoError::InvalidKeyMaterial));
    }

    #[test]
    fn signature_is_deterministic() {
        assert_eq!(sign(b"x", &[8; 32]).unwrap(), sign(b"x", &[8; 32]).unwrap());
    }

    #[test]
    fn derive_address_is_stable() {
        let pk = derive_public_key(&[4; 32]).unwrap();
        assert_eq!(
            derive_address(&pk, Network::Mainnet),
            derive_address(&pk, Network::Mainnet)
        );
    }

    // --- Input signing ---

    #[test]
    fn input_message_layout() {
        let tx_hash = Hash256([1; 32]);
        let op = OutPoint::new(Hash256([2; 32]), 0x0102_0304);
        let msg = input_message(&tx_hash, &op);
        assert_eq!(&msg[..32], &[1; 32]);
        assert_eq!(&msg[32..64], &[2; 32]);
        assert_eq!(&msg[64..], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn sign_and_verify_input() {
        let kp = KeyPair::from_secret_bytes([7; 32]);
        let mut tx = transfer_with_inputs(2);
        sign_input(&mut tx, 0, &kp).unwrap();
        sign_input(&mut tx, 1, &kp).unwrap();
        let hash = tx.hash();
        let owner = kp.public_key().hash160();
        assert!(verify_input(&hash, &tx.inputs[0], &owner).is_ok());
        assert!(verify_input(&hash, &tx.inputs[1], &owner).is_ok());
    }

    #[test]
    fn signature_not_transferable_between_inputs() {
        let kp = KeyPair::from_secret_bytes([7; 32]);
        let mut tx = transfer_with_inputs(2);
        sign_input(&mut tx, 0, &kp).unwrap();
        tx.inputs[1].signature = tx.inputs[0].signature.clone();
        tx.inputs[1].public_key = tx.inputs[0].public_key.clone();
        let err = verify_input(&tx.hash(), &tx.inputs[1], &kp.public_key().hash160());
        assert_eq!(err, Err(CryptoError::VerificationFailed));
    }

    #[test]
    fn verify_input_rejects_other_owner() {
        let kp = KeyPair::from_secret_bytes([7; 32]);
        let mut tx = transfer_with_inputs(1);
        sign_input(&mut tx, 0, &kp).unwrap();
        let err = verify_input(&tx.hash(), &tx.inputs[0], &Hash160([0; 20]));
        assert_eq!(err, Err(CryptoError::OwnerMismatch));
    }

    #[test]
    fn sign_input_out_of_bounds() {
        let kp = KeyPair::from_secret_bytes([7; 32]);
        let mut tx = transfer_with_inputs(1);
        assert_eq!(
            sign_input(&mut tx, 3, &kp),
            Err(CryptoError::InputIndexOutOfBounds { index: 3, len: 1 })
        );
    }

    #[test]
    fn pubkey_serde_hex() {
        let pk = KeyPair::from_secret_bytes([1; 32]).public_key();
        let json = serde_json::to_string(&pk).unwrap();
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pk);
    }
}
