//! In-memory [`ChainStore`].
//!
//! Keeps every persisted block and a replica of the UTXO set built from the
//! persisted deltas. Reopening a ledger over the same store reproduces the
//! committed state.

use crate::error::SanError;
use crate::traits::ChainStore;
use crate::types::{Block, Hash256};
use crate::utxo_set::{UtxoDelta, UtxoSet};

#[derive(Debug, Default)]
pub struct MemoryChainStore {
    blocks: Vec<Block>,
    deltas: Vec<UtxoDelta>,
    utxos: UtxoSet,
    fail_next: bool,
}

impl MemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `persist_block` call fail with a storage error.
    pub fn fail_next_persist(&mut self) {
        self.fail_next = true;
    }

    /// Number of persisted blocks.
    pub fn height(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_at(&self, index: u64) -> Option<&Block> {
        self.blocks.get(usize::try_from(index).ok()?)
    }

    pub fn block_by_hash(&self, hash: &Hash256) -> Option<&Block> {
        self.blocks.iter().find(|b| b.hash() == *hash)
    }

    /// Delta recorded for the block at `index`.
    pub fn delta_at(&self, index: u64) -> Option<&UtxoDelta> {
        self.deltas.get(usize::try_from(index).ok()?)
    }
}

impl ChainStore for MemoryChainStore {
    fn load_utxo_set(&self) -> Result<UtxoSet, SanError> {
        Ok(self.utxos.clone())
    }

    fn persist_block(&mut self, block: &Block, delta: &UtxoDelta) -> Result<(), SanError> {
        if std::mem::take(&mut self.fail_next) {
            return Err(SanError::Storage(format!(
                "injected failure persisting block {}",
                block.index()
            )));
        }
        let expected = self.blocks.len() as u64;
        if block.index() != expected {
            return Err(SanError::Storage(format!(
                "out-of-order block: expected index {expected}, got {}",
                block.index()
            )));
        }
        self.utxos.apply_delta(delta)?;
        self.blocks.push(block.clone());
        self.deltas.push(delta.clone());
        Ok(())
    }

    fn load_chain_tip(&self) -> Result<Option<Block>, SanError> {
        Ok(self.blocks.last().cloned())
    }
}
