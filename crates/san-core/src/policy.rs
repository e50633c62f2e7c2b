//! Monetary constants and the default chain policy.
//!
//! All monetary values in sats (1 SAN = 10^8 sats).

use serde::{Deserialize, Serialize};

use crate::traits::ChainPolicy;

pub const COIN: u64 = 100_000_000;

/// Block subsidy paid to the miner, before fees.
pub const INITIAL_REWARD: u64 = 50 * COIN;

/// Minimum implicit fee a transfer must pay.
pub const MIN_TX_FEE: u64 = 1_000;

/// Blocks a coinbase output must wait before it can be spent.
pub const DEFAULT_COINBASE_MATURITY: u64 = 100;

/// Leading zero bits required of a block header hash.
pub const DEFAULT_DIFFICULTY_BITS: u32 = 8;

/// Largest raw transaction payload accepted at the boundary, in bytes.
pub const MAX_TX_SIZE: usize = 100_000;

/// Upper bound on non-coinbase transactions pulled into a template.
pub const DEFAULT_MAX_BLOCK_TXS: usize = 1_000;

/// Fixed-parameter policy. Difficulty does not adjust.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardPolicy {
    pub block_reward: u64,
    pub min_fee: u64,
    pub coinbase_maturity: u64,
    pub difficulty_bits: u32,
}

impl Default for StandardPolicy {
    fn default() -> Self {
        Self {
            block_reward: INITIAL_REWARD,
            min_fee: MIN_TX_FEE,
            coinbase_maturity: DEFAULT_COINBASE_MATURITY,
            difficulty_bits: DEFAULT_DIFFICULTY_BITS,
        }
    }
}

impl StandardPolicy {
    /// Local development: coinbase spendable after one block, trivial work.
    pub fn regtest() -> Self {
        Self {
            coinbase_maturity: 1,
            difficulty_bits: 0,
            ..Self::default()
        }
    }
}

impl ChainPolicy for StandardPolicy {
    fn block_reward(&self, _height: u64) -> u64 {
        self.block_reward
    }

    fn min_fee(&self) -> u64 {
        self.min_fee
    }

    fn coinbase_maturity(&self) -> u64 {
        self.coinbase_maturity
    }

    fn difficulty(&self, _height: u64) -> u32 {
        self.difficulty_bits
    }
}
