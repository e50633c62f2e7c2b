//! Transfer builder with coin selection and signing.
//!
//! 1. Add recipients (address + amount)
//! 2. Build an unsigned transfer (performs coin selection, adds change)
//! 3. Sign every input with the key owning the spent output

use san_core::address::Address;
use san_core::crypto::sign_input;
use san_core::policy::MIN_TX_FEE;
use san_core::types::{Transaction, TransferTx, TxInput, TxOutput, Utxo};

use crate::coin_selection::{CoinSelection, CoinSelector};
use crate::error::WalletError;
use crate::keys::KeyChain;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub address: Address,
    pub amount: u64,
}

/// A transfer with empty signature material.
#[derive(Debug, Clone)]
pub struct UnsignedTransfer {
    pub tx: TransferTx,
    /// The selection that funded it. `selected[i]` is spent by input `i`.
    pub selection: CoinSelection,
}

/// Builder for signed transfers.
///
/// ```ignore
/// let unsigned = TransactionBuilder::new()
///     .add_recipient(bob, 5 * COIN)
///     .build(&utxos, &change, now)?;
/// let tx = TransactionBuilder::sign(unsigned, &keychain)?;
/// ```
pub struct TransactionBuilder {
    recipients: Vec<Recipient>,
    fee: u64,
}

impl TransactionBuilder {
    /// A builder paying the minimum fee.
    pub fn new() -> Self {
        Self {
            recipients: Vec::new(),
            fee: MIN_TX_FEE,
        }
    }

    pub fn add_recipient(&mut self, address: Address, amount: u64) -> &mut Self {
        self.recipients.push(Recipient { address, amount });
        self
    }

    pub fn set_fee(&mut self, fee: u64) -> &mut Self {
        self.fee = fee;
        self
    }

    /// Select coins and lay out outputs: recipients in order, then change if any.
    pub fn build(
        &self,
        utxos: &[Utxo],
        change_address: &Address,
        timestamp: u64,
    ) -> Result<UnsignedTransfer, WalletError> {
        if self.recipients.is_empty() {
            return Err(WalletError::BuildError("no recipients".into()));
        }

        let mut total_send: u64 = 0;
        for r in &self.recipients {
            if r.amount == 0 {
                return Err(WalletError::InvalidAmount("recipient amount is zero".into()));
            }
            total_send = total_send
                .checked_add(r.amount)
                .ok_or_else(|| WalletError::InvalidAmount("total amount overflow".into()))?;
        }

        let selection = CoinSelector::select(utxos, total_send, self.fee)?;

        let inputs = selection
            .selected
            .iter()
            .map(|u| TxInput::unsigned(u.outpoint))
            .collect();

        let mut outputs: Vec<TxOutput> = self
            .recipients
            .iter()
            .map(|r| TxOutput::to(r.address, r.amount))
            .collect();
        if selection.change > 0 {
            outputs.push(TxOutput::to(*change_address, selection.change));
        }

        Ok(UnsignedTransfer {
            tx: TransferTx {
                inputs,
                outputs,
                timestamp,
            },
            selection,
        })
    }

    /// Sign every input with the keychain key that owns the spent output.
    pub fn sign(unsigned: UnsignedTransfer, keychain: &KeyChain) -> Result<Transaction, WalletError> {
        let mut tx = unsigned.tx;
        for (i, utxo) in unsigned.selection.selected.iter().enumerate() {
            let owner = utxo.output.locking_script.pubkey_hash();
            let kp = keychain
                .keypair_for_hash(owner)
                .ok_or_else(|| WalletError::KeyNotFound(format!("owner of {}", utxo.outpoint)))?;
            sign_input(&mut tx, i, kp)?;
        }
        Ok(Transaction::Transfer(tx))
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
