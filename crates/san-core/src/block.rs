//! Block assembly and validation.
//!
//! - **Assembly** ([`assemble`]): build a template from the mempool's priority
//!   order, prepend a coinbase paying reward plus fees, and compute the merkle
//!   root. The nonce is left for the miner.
//! - **Validation** ([`validate_block`]): linkage, proof of work, merkle root,
//!   structure, then every transaction against the pre-block UTXO set plus the
//!   outputs of transactions earlier in the same block.
//! - **Application** ([`validate_and_apply`]): validation followed by an atomic
//!   apply. Any failure leaves the UTXO set untouched.
//!
//! With no chain tip, the only acceptable block is genesis: index 0 with a zero
//! parent hash.

use std::collections::{HashMap, HashSet};

use crate::address::Address;
use crate::error::{ChainError, LedgerError};
use crate::mempool::Mempool;
use crate::merkle;
use crate::traits::{ChainPolicy, NoPending, UtxoView};
use crate::types::{
    Block, BlockHeader, ChainTip, CoinbaseTx, Hash256, OutPoint, Transaction, TxOutput, Utxo,
};
use crate::utxo_set::{UtxoDelta, UtxoSet};
use crate::validation::{validate_transaction, ValidationContext};

/// Inputs to [`assemble`] supplied by the mining collaborator.
#[derive(Debug, Clone)]
pub struct AssemblyParams<'a> {
    /// Subsidy for the new block, before fees.
    pub coinbase_reward: u64,
    pub miner_address: &'a Address,
    /// Maximum number of non-coinbase transactions.
    pub max_tx_count: usize,
    pub timestamp: u64,
    /// Leading zero bits the miner must reach.
    pub difficulty: u32,
}

/// Summary of a block that passed [`validate_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedBlock {
    pub hash: Hash256,
    pub height: u64,
    /// Sum of implicit fees of all transfers.
    pub total_fees: u64,
    /// Value paid by the coinbase; zero when there is none.
    pub coinbase_value: u64,
    pub tx_count: usize,
}

impl ValidatedBlock {
    pub fn tip(&self) -> ChainTip {
        ChainTip {
            index: self.height,
            hash: self.hash,
        }
    }
}

/// Index and parent hash the next block must carry.
pub fn next_position(tip: Option<&ChainTip>) -> (u64, Hash256) {
    match tip {
        Some(tip) => (tip.index + 1, tip.hash),
        None => (0, Hash256::ZERO),
    }
}

// --- Assembly ---

/// Build a block template from the mempool.
///
/// Entries are taken in priority order. A transaction that spends an output of
/// another pool entry is deferred until that parent is in the block, so every
/// input refers to an output created earlier. The coinbase pays
/// `coinbase_reward + fees` and is omitted only when that value is zero.
pub fn assemble(
    mempool: &Mempool,
    tip: Option<&ChainTip>,
    params: &AssemblyParams<'_>,
) -> Result<Block, ChainError> {
    let (index, previous_hash) = next_position(tip);

    let candidates: Vec<_> = mempool.entries_by_priority().collect();
    let mut included: HashSet<Hash256> = HashSet::new();
    let mut chosen = Vec::new();
    let mut progress = true;
    while progress && chosen.len() < params.max_tx_count {
        progress = false;
        for entry in &candidates {
            if chosen.len() >= params.max_tx_count {
                break;
            }
            let hash = entry.hash();
            if included.contains(&hash) || !entry.parents.iter().all(|p| included.contains(p)) {
                continue;
            }
            included.insert(hash);
            chosen.push(*entry);
            progress = true;
        }
    }

    let fees = chosen
        .iter()
        .try_fold(0u64, |acc, e| acc.checked_add(e.tx.fee))
        .ok_or(LedgerError::AmountOverflow)?;
    let coinbase_value = params
        .coinbase_reward
        .checked_add(fees)
        .ok_or(LedgerError::AmountOverflow)?;

    let mut transactions = Vec::with_capacity(chosen.len() + 1);
    if coinbase_value > 0 {
        transactions.push(Transaction::Coinbase(CoinbaseTx {
            outputs: vec![TxOutput::to(*params.miner_address, coinbase_value)],
            height: index,
            timestamp: params.timestamp,
        }));
    }
    transactions.extend(chosen.into_iter().map(|e| e.tx.tx.clone()));

    let merkle_root = merkle::merkle_root(
        &transactions.iter().map(Transaction::hash).collect::<Vec<_>>(),
    );

    Ok(Block {
        header: BlockHeader {
            index,
            previous_hash,
            merkle_root,
            timestamp: params.timestamp,
            difficulty: params.difficulty,
            nonce: 0,
        },
        transactions,
    })
}

// --- Proof of work ---

/// Number of leading zero bits in `hash`.
pub fn leading_zero_bits(hash: &Hash256) -> u32 {
    let mut bits = 0;
    for byte in hash.as_bytes() {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

/// Whether the header hash reaches the header's own difficulty.
pub fn check_pow(header: &BlockHeader) -> bool {
    leading_zero_bits(&header.hash()) >= header.difficulty
}

/// Search nonces in `[0, max_nonce]`. Sets the winning nonce and returns `true`
/// on success.
pub fn mine_block(block: &mut Block, max_nonce: u64) -> bool {
    for nonce in 0..=max_nonce {
        block.header.nonce = nonce;
        if check_pow(&block.header) {
            return true;
        }
    }
    false
}

// --- Validation ---

/// Committed outputs plus the effects of transactions already seen in a block.
struct BlockOverlay<'a> {
    base: &'a dyn UtxoView,
    created: HashMap<OutPoint, Utxo>,
    spent: HashSet<OutPoint>,
}

impl<'a> BlockOverlay<'a> {
    fn new(base: &'a dyn UtxoView) -> Self {
        Self {
            base,
            created: HashMap::new(),
            spent: HashSet::new(),
        }
    }

    fn apply(&mut self, tx: &Transaction, hash: Hash256, height: u64) {
        self.spent.extend(tx.spent_outpoints());
        for (index, output) in tx.outputs().iter().enumerate() {
            let outpoint = OutPoint::new(hash, index as u32);
            self.created.insert(
                outpoint,
                Utxo {
                    outpoint,
                    output: output.clone(),
                    block_height: height,
                    is_coinbase: tx.is_coinbase(),
                },
            );
        }
    }
}

impl UtxoView for BlockOverlay<'_> {
    fn utxo(&self, outpoint: &OutPoint) -> Option<Utxo> {
        if self.spent.contains(outpoint) {
            return None;
        }
        self.created
            .get(outpoint)
            .cloned()
            .or_else(|| self.base.utxo(outpoint))
    }
}

/// Coinbase placement rules. Returns whether the block leads with a coinbase.
fn check_structure(block: &Block, reward: u64) -> Result<bool, ChainError> {
    let Some(first) = block.transactions.first() else {
        return if reward > 0 { Err(ChainError::NoCoinbase) } else { Ok(false) };
    };
    let has_coinbase = first.is_coinbase();
    if !has_coinbase && reward > 0 {
        return Err(ChainError::FirstTxNotCoinbase);
    }
    if block.transactions.iter().skip(1).any(Transaction::is_coinbase) {
        return Err(if has_coinbase {
            ChainError::MultipleCoinbase
        } else {
            ChainError::FirstTxNotCoinbase
        });
    }

    let mut hashes = HashSet::with_capacity(block.transactions.len());
    for tx in &block.transactions {
        let hash = tx.hash();
        if !hashes.insert(hash) {
            return Err(ChainError::DuplicateTxid(hash));
        }
    }

    let mut spends = HashSet::new();
    for outpoint in block.transactions.iter().flat_map(Transaction::spent_outpoints) {
        if !spends.insert(outpoint) {
            return Err(ChainError::DoubleSpend(outpoint));
        }
    }
    Ok(has_coinbase)
}

/// Validate `block` as the successor of `tip` without mutating anything.
pub fn validate_block(
    block: &Block,
    utxos: &dyn UtxoView,
    tip: Option<&ChainTip>,
    policy: &dyn ChainPolicy,
) -> Result<ValidatedBlock, ChainError> {
    let header = &block.header;
    let (height, parent) = next_position(tip);

    if header.previous_hash != parent {
        return Err(ChainError::ForkOrStale {
            expected: parent,
            got: header.previous_hash,
        });
    }
    if header.index != height {
        return Err(ChainError::HeightMismatch {
            expected: height,
            got: header.index,
        });
    }

    let expected_difficulty = policy.difficulty(height);
    if header.difficulty != expected_difficulty {
        return Err(ChainError::InvalidDifficulty {
            got: header.difficulty,
            expected: expected_difficulty,
        });
    }
    if !check_pow(header) {
        return Err(ChainError::InvalidProofOfWork);
    }

    let computed = block.compute_merkle_root();
    if header.merkle_root != computed {
        return Err(ChainError::MerkleMismatch {
            header: header.merkle_root,
            computed,
        });
    }

    let reward = policy.block_reward(height);
    let has_coinbase = check_structure(block, reward)?;

    let mut overlay = BlockOverlay::new(utxos);
    let ctx = ValidationContext::for_height(policy, height);
    let mut total_fees: u64 = 0;
    let first_transfer = usize::from(has_coinbase);

    if let Some(coinbase) = block.transactions.first().filter(|_| has_coinbase) {
        overlay.apply(coinbase, coinbase.hash(), height);
    }

    for (index, tx) in block.transactions.iter().enumerate().skip(first_transfer) {
        let validated = validate_transaction(tx, None, &overlay, &NoPending, &ctx)
            .map_err(|source| ChainError::Transaction { index, source })?;
        total_fees = total_fees
            .checked_add(validated.fee)
            .ok_or(LedgerError::AmountOverflow)?;
        overlay.apply(tx, validated.hash, height);
    }

    let expected_value = reward
        .checked_add(total_fees)
        .ok_or(LedgerError::AmountOverflow)?;
    let coinbase_value = match block.transactions.first().filter(|_| has_coinbase) {
        Some(coinbase) => {
            let cb_ctx = ctx.with_coinbase_value(expected_value);
            validate_transaction(coinbase, None, utxos, &NoPending, &cb_ctx)
                .map_err(|source| ChainError::Transaction { index: 0, source })?
                .total_output
        }
        None if expected_value > 0 => return Err(ChainError::NoCoinbase),
        None => 0,
    };

    Ok(ValidatedBlock {
        hash: block.hash(),
        height,
        total_fees,
        coinbase_value,
        tx_count: block.transactions.len(),
    })
}

/// Validate `block` and compute its UTXO changes, leaving `utxos` untouched.
pub fn validate_and_stage(
    block: &Block,
    utxos: &UtxoSet,
    tip: Option<&ChainTip>,
    policy: &dyn ChainPolicy,
) -> Result<(ValidatedBlock, UtxoDelta), ChainError> {
    let validated = validate_block(block, utxos, tip, policy)?;
    let delta = utxos.stage_block(block)?;
    Ok((validated, delta))
}

/// Validate `block` and apply it atomically. Returns the new tip and the delta.
pub fn validate_and_apply(
    block: &Block,
    utxos: &mut UtxoSet,
    tip: Option<&ChainTip>,
    policy: &dyn ChainPolicy,
) -> Result<(ChainTip, UtxoDelta), ChainError> {
    let (validated, delta) = validate_and_stage(block, utxos, tip, policy)?;
    utxos.apply_delta(&delta)?;
    Ok((validated.tip(), delta))
}
