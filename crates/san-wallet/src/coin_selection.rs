//! Largest-first coin selection.
//!
//! Candidates are ordered by amount descending, ties broken by outpoint
//! ascending, and taken greedily until `target + fee` is covered. Selection is
//! a pure query: nothing is marked spent.

use std::collections::HashSet;

use san_core::types::Utxo;
use san_core::utxo_set::sort_for_selection;

use crate::error::WalletError;

/// Result of coin selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSelection {
    /// Chosen outputs, in selection order.
    pub selected: Vec<Utxo>,
    /// Sum of selected amounts.
    pub total: u64,
    /// `total - target - fee`.
    pub change: u64,
    pub fee: u64,
}

pub struct CoinSelector;

impl CoinSelector {
    /// Select outputs covering `target + fee`.
    ///
    /// Duplicate outpoints in `utxos` are considered once.
    pub fn select(utxos: &[Utxo], target: u64, fee: u64) -> Result<CoinSelection, WalletError> {
        if target == 0 {
            return Err(WalletError::InvalidAmount("target must be non-zero".into()));
        }
        let needed = target
            .checked_add(fee)
            .ok_or_else(|| WalletError::InvalidAmount("target plus fee overflows".into()))?;

        let mut candidates: Vec<&Utxo> = utxos.iter().collect();
        sort_for_selection(&mut candidates);
        let mut seen = HashSet::with_capacity(candidates.len());
        candidates.retain(|u| seen.insert(u.outpoint));

        let mut selected = Vec::new();
        let mut total: u64 = 0;
        for utxo in candidates {
            selected.push(utxo.clone());
            total = total
                .checked_add(utxo.amount())
                .ok_or_else(|| WalletError::InvalidAmount("selected total overflows".into()))?;
            if total >= needed {
                return Ok(CoinSelection {
                    selected,
                    total,
                    change: total - needed,
                    fee,
                });
            }
        }

        Err(WalletError::InsufficientFunds {
            have: total,
            need: needed,
        })
    }
}
