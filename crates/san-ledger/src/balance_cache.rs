//! Derived per-address balance cache.
//!
//! The UTXO set is always authoritative. Entries are filled lazily from it
//! and dropped for every address a committed block touches, so a cached
//! value is either absent or equal to a fresh sum.
//!
//! Zero balances are never stored, so lookups of unfunded addresses leave
//! no trace. The map is bounded by a capacity and is emptied when a new
//! entry would exceed it.

use std::collections::HashMap;

use san_core::address::Address;
use san_core::error::LedgerError;
use san_core::utxo_set::UtxoSet;

/// A cached balance that no longer matches the UTXO set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub address: Address,
    pub cached: u64,
    pub actual: u64,
}

/// Default upper bound on cached addresses.
pub const DEFAULT_CAPACITY: usize = 100_000;

#[derive(Debug)]
pub struct BalanceCache {
    entries: HashMap<Address, u64>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl Default for BalanceCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding at most `capacity` addresses (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            hits: 0,
            misses: 0,
        }
    }

    /// Cached balance of `address`, computing and storing it on a miss.
    pub fn get_or_compute(&mut self, address: &Address, utxos: &UtxoSet) -> Result<u64, LedgerError> {
        if let Some(balance) = self.entries.get(address) {
            self.hits += 1;
            return Ok(*balance);
        }
        self.misses += 1;
        let balance = utxos.balance(address)?;
        if balance > 0 {
            if self.entries.len() >= self.capacity {
                self.entries.clear();
            }
            self.entries.insert(*address, balance);
        }
        Ok(balance)
    }

    pub fn cached(&self, address: &Address) -> Option<u64> {
        self.entries.get(address).copied()
    }

    /// Drop entries for `addresses`. Returns how many were present.
    pub fn invalidate<'a>(&mut self, addresses: impl IntoIterator<Item = &'a Address>) -> usize {
        addresses
            .into_iter()
            .filter(|a| self.entries.remove(a).is_some())
            .count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `(hits, misses)` since creation.
    pub fn counters(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    /// Recompute every cached entry against `utxos`.
    pub fn verify_consistency(&self, utxos: &UtxoSet) -> Result<Vec<Mismatch>, LedgerError> {
        let mut mismatches = Vec::new();
        for (address, cached) in &self.entries {
            let actual = utxos.balance(address)?;
            if actual != *cached {
                mismatches.push(Mismatch {
                    address: *address,
                    cached: *cached,
                    actual,
                });
            }
        }
        mismatches.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(mismatches)
    }
}
