//! The authoritative set of unspent transaction outputs.
//!
//! Outputs are keyed by [`OutPoint`] with a secondary index by address.
//! Block application is split into a pure staging step ([`UtxoSet::stage_block`])
//! that produces a [`UtxoDelta`], and [`UtxoSet::apply_delta`], which re-checks
//! every spent outpoint and then mutates. Both run under `&self`/`&mut self`,
//! so a caller holding the set behind a `RwLock` write guard gets check and
//! removal in one critical section.
//!
//! The set also remembers how many outputs every committed transaction
//! created. That lets a missing outpoint be classified as
//! [`LedgerError::DoubleSpend`] (it existed and was consumed) rather than
//! [`LedgerError::UnknownInput`] (it never existed).

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::LedgerError;
use crate::traits::UtxoView;
use crate::types::{Block, Hash256, OutPoint, Utxo};

/// Changes a block makes to the UTXO set.
///
/// `spent` carries full records so the change can be undone or persisted.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UtxoDelta {
    /// Height of the block this delta belongs to.
    pub height: u64,
    /// Outputs added. Excludes outputs both created and spent inside the block.
    pub created: Vec<Utxo>,
    /// Pre-existing outputs removed.
    pub spent: Vec<Utxo>,
    /// `(tx_hash, output_count)` for every transaction in the block.
    pub transactions: Vec<(Hash256, u32)>,
}

impl UtxoDelta {
    /// Addresses whose balance this delta changes.
    pub fn touched_addresses(&self) -> BTreeSet<Address> {
        self.created
            .iter()
            .chain(self.spent.iter())
            .map(|u| *u.address())
            .collect()
    }
}

/// Aggregate figures over the whole set.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UtxoStats {
    pub count: usize,
    pub total: u64,
    /// Integer mean, rounded down. Zero for an empty set.
    pub average: u64,
    pub max: u64,
    pub min: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    utxos: HashMap<OutPoint, Utxo>,
    by_address: BTreeMap<Address, BTreeSet<OutPoint>>,
    /// Committed transaction hash -> number of outputs it created.
    known_txs: HashMap<Hash256, u32>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from existing records.
    ///
    /// Only unspent outputs are known to the result, so spending an output of
    /// a fully consumed transaction reports `UnknownInput` rather than
    /// `DoubleSpend`. Use [`replay`](Self::replay) to keep that distinction.
    pub fn from_utxos(utxos: impl IntoIterator<Item = Utxo>) -> Self {
        let mut set = Self::new();
        for utxo in utxos {
            set.insert(utxo);
        }
        set
    }

    /// Rebuild a set by applying persisted deltas in height order.
    pub fn replay<'a>(deltas: impl IntoIterator<Item = &'a UtxoDelta>) -> Result<Self, LedgerError> {
        let mut set = Self::new();
        for delta in deltas {
            set.apply_delta(delta)?;
        }
        Ok(set)
    }

    /// Insert a single record. Returns any record it replaced.
    pub fn insert(&mut self, utxo: Utxo) -> Option<Utxo> {
        let op = utxo.outpoint;
        let seen = self.known_txs.entry(op.tx_hash).or_insert(0);
        *seen = (*seen).max(op.index.saturating_add(1));
        self.by_address.entry(*utxo.address()).or_default().insert(op);
        let previous = self.utxos.insert(op, utxo);
        if let Some(prev) = &previous {
            if prev.address() != self.utxos[&op].address() {
                self.unindex(prev.address(), &op);
            }
        }
        previous
    }

    fn remove(&mut self, outpoint: &OutPoint) -> Option<Utxo> {
        let utxo = self.utxos.remove(outpoint)?;
        self.unindex(utxo.address(), outpoint);
        Some(utxo)
    }

    fn unindex(&mut self, address: &Address, outpoint: &OutPoint) {
        if let Some(set) = self.by_address.get_mut(address) {
            set.remove(outpoint);
            if set.is_empty() {
                self.by_address.remove(address);
            }
        }
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&Utxo> {
        self.utxos.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.utxos.contains_key(outpoint)
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    /// All records, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Utxo> {
        self.utxos.values()
    }

    /// Outputs owned by `address`, amount descending then outpoint ascending.
    pub fn list_by_address(&self, address: &Address) -> Vec<&Utxo> {
        let mut list: Vec<&Utxo> = self
            .by_address
            .get(address)
            .into_iter()
            .flatten()
            .filter_map(|op| self.utxos.get(op))
            .collect();
        sort_for_selection(&mut list);
        list
    }

    /// Sum of the amounts owned by `address`.
    pub fn balance(&self, address: &Address) -> Result<u64, LedgerError> {
        checked_sum(self.list_by_address(address).into_iter())
    }

    /// Classify an outpoint that is not currently unspent.
    fn missing(&self, outpoint: &OutPoint) -> LedgerError {
        match self.known_txs.get(&outpoint.tx_hash) {
            Some(&count) if outpoint.index < count => LedgerError::DoubleSpend(*outpoint),
            _ => LedgerError::UnknownInput(*outpoint),
        }
    }

    /// Compute the changes `block` would make without mutating anything.
    ///
    /// Transactions are applied in block order, so an input may consume an
    /// output created earlier in the same block but not one created later.
    pub fn stage_block(&self, block: &Block) -> Result<UtxoDelta, LedgerError> {
        let height = block.header.index;
        let mut created: Vec<Utxo> = Vec::new();
        let mut created_in_block: HashSet<OutPoint> = HashSet::new();
        let mut consumed: HashSet<OutPoint> = HashSet::new();
        let mut spent = Vec::new();
        let mut transactions = Vec::with_capacity(block.transactions.len());

        for tx in &block.transactions {
            let tx_hash = tx.hash();
            tx.total_output().ok_or(LedgerError::AmountOverflow)?;

            for op in tx.spent_outpoints() {
                if !consumed.insert(op) {
                    return Err(LedgerError::DoubleSpend(op));
                }
                if created_in_block.contains(&op) {
                    continue;
                }
                match self.utxos.get(&op) {
                    Some(utxo) => spent.push(utxo.clone()),
                    None => return Err(self.missing(&op)),
                }
            }

            for (index, output) in tx.outputs().iter().enumerate() {
                let outpoint = OutPoint::new(tx_hash, index as u32);
                created_in_block.insert(outpoint);
                created.push(Utxo {
                    outpoint,
                    output: output.clone(),
                    block_height: height,
                    is_coinbase: tx.is_coinbase(),
                });
            }
            transactions.push((tx_hash, tx.outputs().len() as u32));
        }

        created.retain(|u| !consumed.contains(&u.outpoint));
        Ok(UtxoDelta {
            height,
            created,
            spent,
            transactions,
        })
    }

    /// Apply a staged delta. Every spent outpoint is re-checked before any
    /// mutation; on error the set is unchanged.
    pub fn apply_delta(&mut self, delta: &UtxoDelta) -> Result<(), LedgerError> {
        for utxo in &delta.spent {
            if !self.utxos.contains_key(&utxo.outpoint) {
                return Err(self.missing(&utxo.outpoint));
            }
        }
        checked_sum(delta.created.iter())?;

        for utxo in &delta.spent {
            self.remove(&utxo.outpoint);
        }
        for &(tx_hash, count) in &delta.transactions {
            let seen = self.known_txs.entry(tx_hash).or_insert(0);
            *seen = (*seen).max(count);
        }
        for utxo in &delta.created {
            self.insert(utxo.clone());
        }
        Ok(())
    }

    /// Stage and apply `block` in one step.
    pub fn apply_block(&mut self, block: &Block) -> Result<UtxoDelta, LedgerError> {
        let delta = self.stage_block(block)?;
        self.apply_delta(&delta)?;
        Ok(delta)
    }

    // --- Statistics ---

    pub fn total_value(&self) -> Result<u64, LedgerError> {
        checked_sum(self.utxos.values())
    }

    /// The largest output; ties go to the lowest outpoint.
    pub fn largest(&self) -> Option<&Utxo> {
        self.utxos.values().min_by(|a, b| {
            b.amount()
                .cmp(&a.amount())
                .then_with(|| a.outpoint.cmp(&b.outpoint))
        })
    }

    pub fn stats(&self) -> Result<UtxoStats, LedgerError> {
        let total = self.total_value()?;
        let count = self.utxos.len();
        let max = self.utxos.values().map(Utxo::amount).max().unwrap_or(0);
        let min = self.utxos.values().map(Utxo::amount).min().unwrap_or(0);
        let average = if count == 0 { 0 } else { total / count as u64 };
        Ok(UtxoStats {
            count,
            total,
            average,
            max,
            min,
        })
    }

    /// Outputs with `min <= amount <= max`, largest first, at most `limit`.
    pub fn by_amount_range(&self, min: u64, max: u64, limit: usize) -> Vec<&Utxo> {
        let mut list: Vec<&Utxo> = self
            .utxos
            .values()
            .filter(|u| (min..=max).contains(&u.amount()))
            .collect();
        sort_for_selection(&mut list);
        list.truncate(limit);
        list
    }

    /// Addresses holding the most outputs, ties broken by address.
    pub fn top_addresses_by_count(&self, limit: usize) -> Vec<(Address, usize)> {
        let mut counts: Vec<(Address, usize)> = self
            .by_address
            .iter()
            .map(|(addr, ops)| (*addr, ops.len()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(limit);
        counts
    }

    /// Number of distinct addresses holding at least one output.
    pub fn address_count(&self) -> usize {
        self.by_address.len()
    }
}

impl UtxoView for UtxoSet {
    fn utxo(&self, outpoint: &OutPoint) -> Option<Utxo> {
        self.utxos.get(outpoint).cloned()
    }
}

/// Amount descending, then `(tx_hash, index)` ascending.
pub fn sort_for_selection(list: &mut [&Utxo]) {
    list.sort_by(|a, b| {
        b.amount()
            .cmp(&a.amount())
            .then_with(|| a.outpoint.cmp(&b.outpoint))
    });
}

fn checked_sum<'a>(mut utxos: impl Iterator<Item = &'a Utxo>) -> Result<u64, LedgerError> {
    utxos.try_fold(0u64, |acc, u| {
        acc.checked_add(u.amount()).ok_or(LedgerError::AmountOverflow)
    })
}
