//! Seams between the ledger core and its collaborators.
//!
//! - [`ChainPolicy`]: reward, fee, maturity, and difficulty rules supplied by
//!   the consensus side.
//! - [`UtxoView`] and [`PendingOutputs`]: read-only lookups used by validation.
//! - [`ChainStore`]: persistence. The core never touches disk itself.

use crate::error::SanError;
use crate::types::{Block, OutPoint, TxOutput, Utxo};
use crate::utxo_set::{UtxoDelta, UtxoSet};

/// Consensus parameters injected into validation and assembly.
pub trait ChainPolicy: Send + Sync {
    /// Subsidy for the block at `height`, excluding fees.
    fn block_reward(&self, height: u64) -> u64;

    /// Minimum implicit fee for a transfer.
    fn min_fee(&self) -> u64;

    /// Confirmations required before a coinbase output is spendable.
    fn coinbase_maturity(&self) -> u64;

    /// Required leading zero bits for the block at `height`.
    fn difficulty(&self, height: u64) -> u32;
}

/// Read access to committed unspent outputs.
pub trait UtxoView {
    fn utxo(&self, outpoint: &OutPoint) -> Option<Utxo>;
}

/// Outputs created by unconfirmed transactions, for chained spends.
pub trait PendingOutputs {
    fn pending_output(&self, outpoint: &OutPoint) -> Option<TxOutput>;
}

/// A [`PendingOutputs`] with nothing pending. Used for block validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPending;

impl PendingOutputs for NoPending {
    fn pending_output(&self, _outpoint: &OutPoint) -> Option<TxOutput> {
        None
    }
}

/// Persistence collaborator.
///
/// `persist_block` is called after a block fully validates and before the
/// in-memory UTXO set is updated. A failure aborts the commit.
pub trait ChainStore: Send {
    /// Rebuild the UTXO set at startup.
    ///
    /// Stores that keep deltas should rebuild with [`UtxoSet::replay`] so
    /// spends of fully consumed transactions stay classified as double spends.
    fn load_utxo_set(&self) -> Result<UtxoSet, SanError>;

    /// Durably record `block` and the UTXO changes it causes.
    fn persist_block(&mut self, block: &Block, delta: &UtxoDelta) -> Result<(), SanError>;

    /// The most recently persisted block, or `None` before genesis.
    fn load_chain_tip(&self) -> Result<Option<Block>, SanError>;
}
