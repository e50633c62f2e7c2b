//! Transaction validation.
//!
//! [`validate_transaction`] is a pure function of the transaction, an optional
//! caller-claimed hash, a committed UTXO view, a view of pending (mempool)
//! outputs, and a [`ValidationContext`]. It never mutates its inputs, so
//! validating the same transaction twice against the same views gives the
//! same answer.
//!
//! Checks, in order:
//! 1. Recompute the hash; reject a mismatching claimed hash.
//! 2. Outputs: non-empty, positive amounts, script matches address, no overflow.
//! 3. Coinbase: exactly one output paying the expected value at the expected height.
//! 4. Transfer: non-empty, no duplicate inputs; each input resolves (committed
//!    or pending), is mature, and carries a valid signature bound to its outpoint.
//! 5. Conservation: inputs cover outputs and the fee meets the minimum.

use std::collections::HashSet;

use crate::crypto;
use crate::error::ValidationError;
use crate::traits::{ChainPolicy, PendingOutputs, UtxoView};
use crate::types::{CoinbaseTx, Hash256, OutPoint, Transaction, TransferTx};

/// Chain-dependent parameters for validating one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationContext {
    /// Height of the block the transaction would be included in.
    pub height: u64,
    /// Minimum implicit fee for a transfer.
    pub min_fee: u64,
    /// Exact value a coinbase must pay (reward plus block fees).
    pub coinbase_value: u64,
    /// Confirmations required before a coinbase output is spendable.
    pub coinbase_maturity: u64,
}

impl ValidationContext {
    /// Context for the block at `height`, with a fee-less coinbase value.
    pub fn for_height(policy: &dyn ChainPolicy, height: u64) -> Self {
        Self {
            height,
            min_fee: policy.min_fee(),
            coinbase_value: policy.block_reward(height),
            coinbase_maturity: policy.coinbase_maturity(),
        }
    }

    pub fn with_coinbase_value(self, coinbase_value: u64) -> Self {
        Self {
            coinbase_value,
            ..self
        }
    }
}

/// A transaction that passed validation, with its derived figures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTx {
    pub tx: Transaction,
    /// Recomputed hash.
    pub hash: Hash256,
    pub total_input: u64,
    pub total_output: u64,
    /// `total_input - total_output`; zero for coinbase.
    pub fee: u64,
    /// Size used for fee-rate ordering.
    pub size: usize,
}

impl ValidatedTx {
    /// Outpoints this transaction consumes.
    pub fn claimed_outpoints(&self) -> impl Iterator<Item = OutPoint> + '_ {
        self.tx.spent_outpoints()
    }
}

/// Validate `tx` against committed and pending outputs.
pub fn validate_transaction(
    tx: &Transaction,
    claimed_hash: Option<&Hash256>,
    utxos: &dyn UtxoView,
    pending: &dyn PendingOutputs,
    ctx: &ValidationContext,
) -> Result<ValidatedTx, ValidationError> {
    let hash = tx.hash();
    if let Some(claimed) = claimed_hash {
        if *claimed != hash {
            return Err(ValidationError::HashMismatch {
                claimed: *claimed,
                computed: hash,
            });
        }
    }

    let total_output = check_outputs(tx)?;

    let (total_input, fee) = match tx {
        Transaction::Coinbase(cb) => {
            check_coinbase(cb, total_output, ctx)?;
            (0, 0)
        }
        Transaction::Transfer(transfer) => {
            let total_input = check_transfer_inputs(transfer, &hash, utxos, pending, ctx)?;
            if total_input < total_output {
                return Err(ValidationError::InsufficientFunds {
                    have: total_input,
                    need: total_output,
                });
            }
            let fee = total_input - total_output;
            if fee < ctx.min_fee {
                return Err(ValidationError::FeeTooLow {
                    fee,
                    minimum: ctx.min_fee,
                });
            }
            (total_input, fee)
        }
    };

    Ok(ValidatedTx {
        tx: tx.clone(),
        hash,
        total_input,
        total_output,
        fee,
        size: tx.size(),
    })
}

/// Output checks shared by both transaction kinds. Returns the output total.
fn check_outputs(tx: &Transaction) -> Result<u64, ValidationError> {
    if tx.outputs().is_empty() {
        return Err(ValidationError::EmptyOutputs);
    }
    for (i, output) in tx.outputs().iter().enumerate() {
        if output.amount == 0 {
            return Err(ValidationError::ZeroValueOutput(i));
        }
        if !output.script_matches_address() {
            return Err(ValidationError::LockingScriptMismatch(i));
        }
    }
    tx.total_output().ok_or(ValidationError::AmountOverflow)
}

fn check_coinbase(
    cb: &CoinbaseTx,
    total_output: u64,
    ctx: &ValidationContext,
) -> Result<(), ValidationError> {
    if cb.outputs.len() != 1 {
        return Err(ValidationError::InvalidCoinbase(format!(
            "expected exactly one output, got {}",
            cb.outputs.len()
        )));
    }
    if total_output != ctx.coinbase_value {
        return Err(ValidationError::InvalidCoinbase(format!(
            "pays {total_output}, expected {}",
            ctx.coinbase_value
        )));
    }
    if cb.height != ctx.height {
        return Err(ValidationError::InvalidCoinbase(format!(
            "height {} does not match block height {}",
            cb.height, ctx.height
        )));
    }
    Ok(())
}

/// Resolve, authorize, and sum every input of a transfer.
fn check_transfer_inputs(
    tx: &TransferTx,
    hash: &Hash256,
    utxos: &dyn UtxoView,
    pending: &dyn PendingOutputs,
    ctx: &ValidationContext,
) -> Result<u64, ValidationError> {
    if tx.inputs.is_empty() {
        return Err(ValidationError::EmptyInputs);
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.previous_output) {
            return Err(ValidationError::DuplicateInput(input.previous_output));
        }
    }

    let mut total_input: u64 = 0;
    for (index, input) in tx.inputs.iter().enumerate() {
        let outpoint = &input.previous_output;
        let output = match utxos.utxo(outpoint) {
            Some(utxo) => {
                if !utxo.is_mature(ctx.height, ctx.coinbase_maturity) {
                    return Err(ValidationError::ImmatureCoinbase { index });
                }
                utxo.output
            }
            None => pending
                .pending_output(outpoint)
                .ok_or(ValidationError::UnknownInput(*outpoint))?,
        };

        crypto::verify_input(hash, input, output.locking_script.pubkey_hash())
            .map_err(|_| ValidationError::InvalidSignature { index })?;

        total_input = total_input
            .checked_add(output.amount)
            .ok_or(ValidationError::AmountOverflow)?;
    }
    Ok(total_input)
}
