//! Pool of validated, unconfirmed transactions.
//!
//! The mempool provides:
//! - O(1) lookup by transaction hash
//! - O(1) double-spend detection via the claimed-outpoint index
//! - A deterministic priority order (fee rate descending, then arrival
//!   ascending) for block assembly
//! - Chained spends: a transaction may spend an output of another pool entry
//! - Count-limited storage with lowest-priority eviction
//!
//! Conflicts follow a first-seen policy: an entry that already claims an
//! outpoint is never replaced by a later transaction spending it.
//!
//! Entries move `Pending -> Included` (confirmed in a block) or
//! `Pending -> Evicted` (conflict, expiry, or capacity). Removal is final.
//! When an entry is evicted, every descendant that spends its outputs is
//! evicted with it. When an entry is included, its descendants stay, since the
//! outputs they spend are now committed.
//!
//! Not thread-safe; callers serialize access behind a `Mutex`.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::ConflictError;
use crate::traits::{PendingOutputs, UtxoView};
use crate::types::{Block, Hash256, OutPoint, TxOutput};
use crate::validation::ValidatedTx;

/// Default maximum number of transactions in the pool.
pub const DEFAULT_MAX_COUNT: usize = 5_000;

/// Fee rate is `fee * FEE_RATE_PRECISION / size` (milli-sats per byte).
const FEE_RATE_PRECISION: u128 = 1_000;

/// Fee rate in milli-sats per byte. Uses a u128 intermediate.
pub fn compute_fee_rate(fee: u64, size: usize) -> u64 {
    if size == 0 {
        return u64::MAX;
    }
    let rate = (fee as u128) * FEE_RATE_PRECISION / (size as u128);
    rate.min(u64::MAX as u128) as u64
}

/// Why an entry left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalReason {
    /// Confirmed in a committed block.
    Included,
    /// A committed block spent one of its (or an ancestor's) inputs.
    Conflict,
    /// Older than the pool's maximum age.
    Expired,
    /// Pushed out by a higher fee-rate transaction when full.
    Evicted,
    /// Removed on request.
    Requested,
}

/// A transaction removed from the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    pub hash: Hash256,
    pub reason: RemovalReason,
}

#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx: ValidatedTx,
    /// Milli-sats per byte.
    pub fee_rate: u64,
    /// Arrival order; breaks fee-rate ties.
    pub sequence: u64,
    /// Unix time the entry was admitted.
    pub entered_at: u64,
    /// Pool entries whose outputs this entry spends.
    pub parents: BTreeSet<Hash256>,
}

impl MempoolEntry {
    pub fn hash(&self) -> Hash256 {
        self.tx.hash
    }

    fn priority_key(&self) -> PriorityKey {
        (Reverse(self.fee_rate), self.sequence, self.tx.hash)
    }
}

/// Ascending iteration yields highest fee rate first, then earliest arrival.
type PriorityKey = (Reverse<u64>, u64, Hash256);

/// Result of a successful admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub hash: Hash256,
    /// Entries evicted to make room.
    pub evicted: Vec<Removed>,
}

pub struct Mempool {
    entries: HashMap<Hash256, MempoolEntry>,
    /// Claimed outpoint -> hash of the pool entry spending it.
    by_outpoint: HashMap<OutPoint, Hash256>,
    by_priority: BTreeSet<PriorityKey>,
    /// Parent hash -> pool entries spending its outputs.
    children: HashMap<Hash256, BTreeSet<Hash256>>,
    next_sequence: u64,
    max_count: usize,
}

impl Mempool {
    pub fn new(max_count: usize) -> Self {
        Self {
            entries: HashMap::new(),
            by_outpoint: HashMap::new(),
            by_priority: BTreeSet::new(),
            children: HashMap::new(),
            next_sequence: 0,
            max_count,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_COUNT)
    }

    /// Admit a validated transaction.
    ///
    /// Every claimed outpoint must be unclaimed by other entries and must
    /// either be unspent in `utxos` or be an output of another pool entry.
    /// When the pool is full the lowest-priority entry is evicted, but only if
    /// the newcomer pays a strictly higher fee rate and is not its descendant.
    pub fn admit(
        &mut self,
        tx: ValidatedTx,
        utxos: &dyn UtxoView,
        entered_at: u64,
    ) -> Result<Admitted, ConflictError> {
        let hash = tx.hash;
        if self.entries.contains_key(&hash) {
            return Err(ConflictError::AlreadyExists(hash));
        }

        let mut parents = BTreeSet::new();
        for outpoint in tx.claimed_outpoints() {
            if let Some(existing) = self.by_outpoint.get(&outpoint) {
                return Err(ConflictError::DoubleSpendInMempool {
                    outpoint,
                    existing: *existing,
                });
            }
            if utxos.utxo(&outpoint).is_some() {
                continue;
            }
            if self.pending_output(&outpoint).is_some() {
                parents.insert(outpoint.tx_hash);
            } else {
                return Err(ConflictError::UnknownInput(outpoint));
            }
        }

        let fee_rate = compute_fee_rate(tx.fee, tx.size);
        let evicted = self.make_room(fee_rate, &parents)?;

        let entry = MempoolEntry {
            tx,
            fee_rate,
            sequence: self.next_sequence,
            entered_at,
            parents,
        };
        self.next_sequence += 1;
        self.insert_entry(entry);

        Ok(Admitted { hash, evicted })
    }

    /// Evict lowest-priority entries until there is space for one more.
    fn make_room(
        &mut self,
        fee_rate: u64,
        parents: &BTreeSet<Hash256>,
    ) -> Result<Vec<Removed>, ConflictError> {
        let mut evicted = Vec::new();
        if self.entries.len() < self.max_count {
            return Ok(evicted);
        }
        if self.max_count == 0 {
            return Err(ConflictError::PoolFull);
        }
        let ancestors = self.ancestors_of(parents);
        while self.entries.len() >= self.max_count {
            let Some(&(Reverse(lowest_rate), _, lowest)) = self.by_priority.iter().next_back()
            else {
                break;
            };
            if lowest_rate >= fee_rate || ancestors.contains(&lowest) {
                return Err(ConflictError::PoolFull);
            }
            evicted.extend(self.remove_with_descendants(&lowest, RemovalReason::Evicted));
        }
        Ok(evicted)
    }

    fn insert_entry(&mut self, entry: MempoolEntry) {
        let hash = entry.hash();
        for outpoint in entry.tx.claimed_outpoints() {
            self.by_outpoint.insert(outpoint, hash);
        }
        for parent in &entry.parents {
            self.children.entry(*parent).or_default().insert(hash);
        }
        self.by_priority.insert(entry.priority_key());
        self.entries.insert(hash, entry);
    }

    /// Remove a single entry and clean every index. Descendants are untouched.
    fn remove_entry(&mut self, hash: &Hash256) -> Option<MempoolEntry> {
        let entry = self.entries.remove(hash)?;
        for outpoint in entry.tx.claimed_outpoints() {
            self.by_outpoint.remove(&outpoint);
        }
        for parent in &entry.parents {
            if let Some(siblings) = self.children.get_mut(parent) {
                siblings.remove(hash);
                if siblings.is_empty() {
                    self.children.remove(parent);
                }
            }
        }
        if let Some(kids) = self.children.remove(hash) {
            for kid in kids {
                if let Some(child) = self.entries.get_mut(&kid) {
                    child.parents.remove(hash);
                }
            }
        }
        self.by_priority.remove(&entry.priority_key());
        Some(entry)
    }

    /// `hash` followed by every pool entry that transitively spends its outputs.
    fn with_descendants(&self, hash: &Hash256) -> Vec<Hash256> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([*hash]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) || !self.entries.contains_key(&current) {
                continue;
            }
            order.push(current);
            if let Some(kids) = self.children.get(&current) {
                queue.extend(kids.iter().copied());
            }
        }
        order
    }

    fn ancestors_of(&self, parents: &BTreeSet<Hash256>) -> HashSet<Hash256> {
        let mut seen = HashSet::new();
        let mut stack: Vec<Hash256> = parents.iter().copied().collect();
        while let Some(current) = stack.pop() {
            if seen.insert(current) {
                if let Some(entry) = self.entries.get(&current) {
                    stack.extend(entry.parents.iter().copied());
                }
            }
        }
        seen
    }

    fn remove_with_descendants(&mut self, hash: &Hash256, reason: RemovalReason) -> Vec<Removed> {
        self.with_descendants(hash)
            .into_iter()
            .filter_map(|h| self.remove_entry(&h))
            .map(|entry| Removed {
                hash: entry.hash(),
                reason,
            })
            .collect()
    }

    /// Remove `hash` and its descendants. Returns what was removed, `hash` first.
    pub fn remove(&mut self, hash: &Hash256) -> Vec<MempoolEntry> {
        self.with_descendants(hash)
            .into_iter()
            .filter_map(|h| self.remove_entry(&h))
            .collect()
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash256) -> Option<&MempoolEntry> {
        self.entries.get(hash)
    }

    /// Pool entry currently claiming `outpoint`, if any.
    pub fn claimed_by(&self, outpoint: &OutPoint) -> Option<Hash256> {
        self.by_outpoint.get(outpoint).copied()
    }

    /// Entries in priority order: fee rate descending, then arrival ascending.
    pub fn entries_by_priority(&self) -> impl Iterator<Item = &MempoolEntry> {
        self.by_priority
            .iter()
            .filter_map(|(_, _, hash)| self.entries.get(hash))
    }

    /// Validated transactions in priority order.
    pub fn snapshot(&self) -> Vec<ValidatedTx> {
        self.entries_by_priority().map(|e| e.tx.clone()).collect()
    }

    /// Drop entries confirmed by `block` and entries that now conflict with it.
    pub fn remove_confirmed_block(&mut self, block: &Block) -> Vec<Removed> {
        let mut removed = Vec::new();
        let mut block_spends = Vec::new();

        for tx in &block.transactions {
            let hash = tx.hash();
            if self.remove_entry(&hash).is_some() {
                removed.push(Removed {
                    hash,
                    reason: RemovalReason::Included,
                });
            }
            block_spends.extend(tx.spent_outpoints());
        }

        for outpoint in block_spends {
            if let Some(conflicting) = self.by_outpoint.get(&outpoint).copied() {
                removed.extend(self.remove_with_descendants(&conflicting, RemovalReason::Conflict));
            }
        }
        removed
    }

    /// Evict entries admitted at least `max_age` seconds before `now`.
    pub fn expire(&mut self, now: u64, max_age: u64) -> Vec<Removed> {
        let stale: Vec<Hash256> = self
            .entries
            .values()
            .filter(|e| now.saturating_sub(e.entered_at) >= max_age)
            .map(MempoolEntry::hash)
            .collect();
        let mut removed = Vec::new();
        for hash in stale {
            removed.extend(self.remove_with_descendants(&hash, RemovalReason::Expired));
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Sum of fees in the pool, saturating.
    pub fn total_fees(&self) -> u64 {
        self.entries
            .values()
            .fold(0u64, |acc, e| acc.saturating_add(e.tx.fee))
    }
}

impl PendingOutputs for Mempool {
    fn pending_output(&self, outpoint: &OutPoint) -> Option<TxOutput> {
        self.entries
            .get(&outpoint.tx_hash)?
            .tx
            .tx
            .outputs()
            .get(outpoint.index as usize)
            .cloned()
    }
}
