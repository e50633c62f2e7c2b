//! AES-256-GCM wallet encryption keyed by Argon2id.
//!
//! # Wire format
//! ```text
//! salt (16 bytes) || nonce (12 bytes) || ciphertext + auth_tag
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use zeroize::Zeroizing;

use crate::error::WalletError;

pub const SALT_LEN: usize = 16;

pub const NONCE_LEN: usize = 12;

const TAG_LEN: usize = 16;

/// Minimum encrypted payload size (salt + nonce + auth tag).
const MIN_ENCRYPTED_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// Derive a 256-bit key from a password with Argon2id default parameters.
pub fn derive_key(password: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, WalletError> {
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::default()
        .hash_password_into(password, salt, &mut *key)
        .map_err(|e| WalletError::Encryption(format!("key derivation: {e}")))?;
    Ok(key)
}

/// Encrypt with a fresh random salt and nonce.
pub fn encrypt(plaintext: &[u8], password: &[u8]) -> Result<Vec<u8>, WalletError> {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| WalletError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| WalletError::Encryption(e.to_string()))?;

    let mut result = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    result.extend_from_slice(&salt);
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt data produced by [`encrypt`].
///
/// A wrong password and a tampered payload are indistinguishable and both
/// yield [`WalletError::InvalidPassword`].
pub fn decrypt(encrypted: &[u8], password: &[u8]) -> Result<Vec<u8>, WalletError> {
    if encrypted.len() < MIN_ENCRYPTED_LEN {
        return Err(WalletError::CorruptedFile(format!(
            "encrypted data too short: {} < {MIN_ENCRYPTED_LEN}",
            encrypted.len()
        )));
    }

    let (salt, rest) = encrypted.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let key = derive_key(password, salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| WalletError::Encryption(e.to_string()))?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| WalletError::InvalidPassword)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let encrypted = encrypt(b"secret wallet data", b"correct horse").unwrap();
        assert_eq!(decrypt(&encrypted, b"correct horse").unwrap(), b"secret wallet data");
    }

    #[test]
    fn empty_plaintext() {
        let encrypted = encrypt(b"", b"pw").unwrap();
        assert_eq!(encrypted.len(), MIN_ENCRYPTED_LEN);
        assert!(decrypt(&encrypted, b"pw").unwrap().is_empty());
    }

    #[test]
    fn wrong_password_fails() {
        let encrypted = encrypt(b"secret", b"correct").unwrap();
        assert_eq!(decrypt(&encrypted, b"wrong"), Err(WalletError::InvalidPassword));
    }

    #[test]
    fn truncated_data_fails() {
        assert!(matches!(
            decrypt(&[0u8; 10], b"password"),
            Err(WalletError::CorruptedFile(_))
        ));
    }

    #[test]
    fn tampering_anywhere_fails() {
        let encrypted = encrypt(b"secret data", b"password").unwrap();
        for pos in [0, SALT_LEN, encrypted.len() - 1] {
            let mut copy = encrypted.clone();
            copy[pos] ^= 0xFF;
            assert_eq!(
                decrypt(&copy, b"password"),
                Err(WalletError::InvalidPassword),
                "flipped byte {pos}"
            );
        }
    }

    #[test]
    fn salts_differ_between_encryptions() {
        let a = encrypt(b"same", b"pw").unwrap();
        let b = encrypt(b"same", b"pw").unwrap();
        assert_ne!(a[..SALT_LEN], b[..SALT_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn derive_key_deterministic_and_salted() {
        let k1 = derive_key(b"password", b"saltsaltsalt").unwrap();
        let k2 = derive_key(b"password", b"saltsaltsalt").unwrap();
        let k3 = derive_key(b"password", b"othersaltsalt").unwrap();
        assert_eq!(*k1, *k2);
        assert_ne!(*k1, *k3);
    }

    #[test]
    fn short_salt_rejected() {
        assert!(matches!(
            derive_key(b"password", b"salt"),
            Err(WalletError::Encryption(_))
        ));
    }
}
