//! Untrusted transaction payloads from the network collaborator.
//!
//! A [`RawTransaction`] is a flat record with a kind tag. It is converted into
//! the tagged [`Transaction`] at the boundary and rejected as
//! [`ValidationError::Malformed`] when the shape does not fit its kind. The
//! claimed hash, if any, is passed on so validation can compare it with the
//! recomputed one.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::policy::MAX_TX_SIZE;
use crate::types::{CoinbaseTx, Hash256, Transaction, TransferTx, TxInput, TxOutput};

/// Bytes the decoder may claim for one payload, counting both input read and
/// container pre-allocation.
pub const DECODE_LIMIT: usize = 4 * MAX_TX_SIZE;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
#[serde(rename_all = "lowercase")]
pub enum RawTxKind {
    Coinbase,
    Transfer,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct RawTransaction {
    pub kind: RawTxKind,
    /// Hash claimed by the submitter. Never trusted.
    #[serde(default)]
    pub hash: Option<Hash256>,
    #[serde(default)]
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub timestamp: u64,
    /// Coinbase only.
    #[serde(default)]
    pub height: Option<u64>,
}

impl RawTransaction {
    /// Decode from bincode (standard config). Trailing bytes are rejected.
    ///
    /// Payloads over [`MAX_TX_SIZE`] are refused before decoding, and the
    /// decoder is capped at [`DECODE_LIMIT`] so a forged length prefix fails
    /// instead of allocating.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        if bytes.len() > MAX_TX_SIZE {
            return Err(ValidationError::Malformed(format!(
                "payload of {} bytes exceeds {MAX_TX_SIZE}",
                bytes.len()
            )));
        }
        let config = bincode::config::standard().with_limit::<DECODE_LIMIT>();
        let (raw, read): (Self, usize) = bincode::decode_from_slice(bytes, config)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        if read != bytes.len() {
            return Err(ValidationError::Malformed(format!(
                "{} trailing bytes",
                bytes.len() - read
            )));
        }
        Ok(raw)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ValidationError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ValidationError::Malformed(e.to_string()))
    }

    /// Wrap a typed transaction, claiming its current hash.
    pub fn from_transaction(tx: &Transaction) -> Self {
        let hash = Some(tx.hash());
        match tx {
            Transaction::Coinbase(cb) => Self {
                kind: RawTxKind::Coinbase,
                hash,
                inputs: Vec::new(),
                outputs: cb.outputs.clone(),
                timestamp: cb.timestamp,
                height: Some(cb.height),
            },
            Transaction::Transfer(t) => Self {
                kind: RawTxKind::Transfer,
                hash,
                inputs: t.inputs.clone(),
                outputs: t.outputs.clone(),
                timestamp: t.timestamp,
                height: None,
            },
        }
    }

    /// Convert into a typed transaction plus the claimed hash.
    pub fn into_transaction(self) -> Result<(Transaction, Option<Hash256>), ValidationError> {
        let tx = match self.kind {
            RawTxKind::Coinbase => {
                if !self.inputs.is_empty() {
                    return Err(ValidationError::Malformed("coinbase with inputs".into()));
                }
                let height = self
                    .height
                    .ok_or_else(|| ValidationError::Malformed("coinbase without height".into()))?;
                Transaction::Coinbase(CoinbaseTx {
                    outputs: self.outputs,
                    height,
                    timestamp: self.timestamp,
                })
            }
            RawTxKind::Transfer => {
                if self.height.is_some() {
                    return Err(ValidationError::Malformed("transfer with height".into()));
                }
                Transaction::Transfer(TransferTx {
                    inputs: self.inputs,
                    outputs: self.outputs,
                    timestamp: self.timestamp,
                })
            }
        };
        Ok((tx, self.hash))
    }
}

impl From<&Transaction> for RawTransaction {
    fn from(tx: &Transaction) -> Self {
        Self::from_transaction(tx)
    }
}
