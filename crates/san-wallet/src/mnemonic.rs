//! BIP-39 mnemonic backup and restoration of the wallet seed.

use bip39::{Language, Mnemonic};
use zeroize::Zeroize;

use crate::error::WalletError;
use crate::keys::Seed;

/// Encode a 32-byte seed as a 24-word English phrase.
pub fn seed_to_mnemonic(seed: &Seed) -> Result<String, WalletError> {
    let m = Mnemonic::from_entropy_in(Language::English, seed.as_bytes())
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
    Ok(m.to_string())
}

/// Parse a phrase back into a seed. Whitespace and case are normalized.
pub fn mnemonic_to_seed(phrase: &str) -> Result<Seed, WalletError> {
    let normalized = phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let m = Mnemonic::parse_in(Language::English, &normalized)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
    let mut entropy = m.to_entropy();
    if entropy.len() != 32 {
        let len = entropy.len();
        entropy.zeroize();
        return Err(WalletError::InvalidMnemonic(format!(
            "expected 32 bytes of entropy, got {len}"
        )));
    }
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&entropy);
    entropy.zeroize();
    Ok(Seed::from_bytes(bytes))
}
