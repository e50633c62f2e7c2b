//! Core ledger types: transactions, blocks, UTXOs.
//!
//! All monetary values are in sats (1 SAN = 10^8 sats) and held as `u64`.
//!
//! # Canonical transaction layout
//!
//! The transaction hash is BLAKE3 over the following byte layout, with every
//! integer little-endian. Signatures and public keys are excluded so that each
//! input can sign over the hash itself.
//!
//! ```text
//! tag: u8                      0x00 coinbase, 0x01 transfer
//! coinbase: height: u64
//! transfer: input_count: u32 || { prev_tx_hash[32] || output_index: u32 || sequence: u32 }*
//! output_count: u32 || { amount: u64 || network: u8 || address_hash[20] || script_tag: u8 || script_hash[20] }*
//! timestamp: u64
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::address::Address;

/// Canonical type tag for coinbase transactions.
pub const TAG_COINBASE: u8 = 0x00;

/// Canonical type tag for transfer transactions.
pub const TAG_TRANSFER: u8 = 0x01;

/// Canonical tag for [`LockingScript::PayToPubkeyHash`].
const SCRIPT_P2PKH: u8 = 0x00;

/// A 32-byte hash value.
///
/// Used for transaction hashes (BLAKE3), block header hashes (double SHA-256),
/// and merkle roots (BLAKE3).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. Previous hash of the genesis block.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 20-byte `RIPEMD160(SHA256(..))` digest identifying a key owner.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash160(pub [u8; 20]);

impl Hash160 {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Reference to a specific output of a previous transaction.
///
/// Ordering is `(tx_hash, index)` ascending, which is the deterministic
/// tie-break used when listing UTXOs of equal amount.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    /// Hash of the transaction that created the output.
    pub tx_hash: Hash256,
    /// Position of the output within that transaction.
    pub index: u32,
}

impl OutPoint {
    pub fn new(tx_hash: Hash256, index: u32) -> Self {
        Self { tx_hash, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.index)
    }
}

/// Spend condition attached to an output.
///
/// Only pay-to-pubkey-hash exists; the hash must match the output address.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub enum LockingScript {
    /// Spendable by a signature from the key whose hash160 is given.
    PayToPubkeyHash(Hash160),
}

impl LockingScript {
    /// The key hash this script commits to.
    pub fn pubkey_hash(&self) -> &Hash160 {
        match self {
            LockingScript::PayToPubkeyHash(hash) => hash,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            LockingScript::PayToPubkeyHash(_) => SCRIPT_P2PKH,
        }
    }
}

/// A transaction input, spending a previous output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxInput {
    /// The outpoint being spent.
    pub previous_output: OutPoint,
    /// Ed25519 signature (64 bytes) over the per-input message.
    pub signature: Vec<u8>,
    /// Ed25519 public key (32 bytes) of the spender.
    pub public_key: Vec<u8>,
    /// Sender-chosen sequence number. Committed to by the hash.
    pub sequence: u32,
}

impl TxInput {
    /// An input with empty signature material, to be signed later.
    pub fn unsigned(previous_output: OutPoint) -> Self {
        Self {
            previous_output,
            signature: Vec::new(),
            public_key: Vec::new(),
            sequence: u32::MAX,
        }
    }
}

/// A transaction output, creating a new UTXO when committed.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOutput {
    /// Value in sats.
    pub amount: u64,
    /// Recipient address.
    pub address: Address,
    /// Spend condition. Must commit to the same key hash as `address`.
    pub locking_script: LockingScript,
}

impl TxOutput {
    /// Pay `amount` to `address` with the matching pay-to-pubkey-hash script.
    pub fn to(address: Address, amount: u64) -> Self {
        let locking_script = LockingScript::PayToPubkeyHash(*address.hash160());
        Self {
            amount,
            address,
            locking_script,
        }
    }

    /// Whether the locking script commits to this output's address.
    pub fn script_matches_address(&self) -> bool {
        self.locking_script.pubkey_hash() == self.address.hash160()
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.amount.to_le_bytes());
        buf.push(self.address.network().version_byte());
        buf.extend_from_slice(self.address.hash160().as_bytes());
        buf.push(self.locking_script.tag());
        buf.extend_from_slice(self.locking_script.pubkey_hash().as_bytes());
    }
}

/// Block reward transaction. Has no inputs.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct CoinbaseTx {
    /// Reward outputs; exactly one in a valid block.
    pub outputs: Vec<TxOutput>,
    /// Height of the block carrying this coinbase. Keeps coinbase hashes unique.
    pub height: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

impl CoinbaseTx {
    pub fn hash(&self) -> Hash256 {
        hash_canonical(&self.canonical_bytes())
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 8 + 4 + self.outputs.len() * 50 + 8);
        buf.push(TAG_COINBASE);
        buf.extend_from_slice(&self.height.to_le_bytes());
        encode_outputs(&self.outputs, &mut buf);
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf
    }
}

/// Value transfer spending previous outputs.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TransferTx {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

impl TransferTx {
    pub fn hash(&self) -> Hash256 {
        hash_canonical(&self.canonical_bytes())
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(1 + 4 + self.inputs.len() * 40 + 4 + self.outputs.len() * 50 + 8);
        buf.push(TAG_TRANSFER);
        buf.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            buf.extend_from_slice(input.previous_output.tx_hash.as_bytes());
            buf.extend_from_slice(&input.previous_output.index.to_le_bytes());
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        encode_outputs(&self.outputs, &mut buf);
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf
    }
}

fn encode_outputs(outputs: &[TxOutput], buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(outputs.len() as u32).to_le_bytes());
    for output in outputs {
        output.encode_into(buf);
    }
}

fn hash_canonical(bytes: &[u8]) -> Hash256 {
    Hash256(blake3::hash(bytes).into())
}

/// A ledger transaction. Immutable once hashed.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub enum Transaction {
    Coinbase(CoinbaseTx),
    Transfer(TransferTx),
}

impl Transaction {
    /// Compute the transaction hash from the canonical layout.
    pub fn hash(&self) -> Hash256 {
        match self {
            Transaction::Coinbase(tx) => tx.hash(),
            Transaction::Transfer(tx) => tx.hash(),
        }
    }

    /// The canonical bytes the hash is computed over.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Transaction::Coinbase(tx) => tx.canonical_bytes(),
            Transaction::Transfer(tx) => tx.canonical_bytes(),
        }
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self, Transaction::Coinbase(_))
    }

    /// Inputs of the transaction. Empty for coinbase.
    pub fn inputs(&self) -> &[TxInput] {
        match self {
            Transaction::Coinbase(_) => &[],
            Transaction::Transfer(tx) => &tx.inputs,
        }
    }

    pub fn outputs(&self) -> &[TxOutput] {
        match self {
            Transaction::Coinbase(tx) => &tx.outputs,
            Transaction::Transfer(tx) => &tx.outputs,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Transaction::Coinbase(tx) => tx.timestamp,
            Transaction::Transfer(tx) => tx.timestamp,
        }
    }

    /// Sum of all output amounts. Returns `None` on overflow.
    pub fn total_output(&self) -> Option<u64> {
        self.outputs()
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.amount))
    }

    /// Outpoints consumed by this transaction, in input order.
    pub fn spent_outpoints(&self) -> impl Iterator<Item = OutPoint> + '_ {
        self.inputs().iter().map(|input| input.previous_output)
    }

    /// Size used for fee-rate ordering: canonical bytes plus signature material.
    pub fn size(&self) -> usize {
        let witness: usize = self
            .inputs()
            .iter()
            .map(|input| input.signature.len() + input.public_key.len())
            .sum();
        self.canonical_bytes().len() + witness
    }
}

/// Block header. `hash` is double SHA-256 over a fixed little-endian layout.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    /// Height of this block; parent index + 1, genesis is 0.
    pub index: u64,
    /// Hash of the parent block header. Zero for genesis.
    pub previous_hash: Hash256,
    /// Merkle root over the block's transaction hashes.
    pub merkle_root: Hash256,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Required leading zero bits of the header hash.
    pub difficulty: u32,
    /// Proof-of-work nonce, filled in by the miner.
    pub nonce: u64,
}

impl BlockHeader {
    const HASH_SIZE: usize = 3 * 8 + 4 + 2 * 32;

    /// Layout: index || previous_hash || merkle_root || timestamp || difficulty || nonce.
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(Self::HASH_SIZE);
        data.extend_from_slice(&self.index.to_le_bytes());
        data.extend_from_slice(self.previous_hash.as_bytes());
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&self.difficulty.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        let first = Sha256::digest(&data);
        Hash256(Sha256::digest(first).into())
    }
}

/// A block: header plus ordered transactions.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    pub header: BlockHeader,
    /// First transaction is the coinbase when a reward exists.
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn index(&self) -> u64 {
        self.header.index
    }

    /// The leading coinbase, if any.
    pub fn coinbase(&self) -> Option<&CoinbaseTx> {
        match self.transactions.first() {
            Some(Transaction::Coinbase(cb)) => Some(cb),
            _ => None,
        }
    }

    /// Hashes of all transactions in block order.
    pub fn tx_hashes(&self) -> Vec<Hash256> {
        self.transactions.iter().map(Transaction::hash).collect()
    }

    /// Merkle root recomputed from the transactions.
    pub fn compute_merkle_root(&self) -> Hash256 {
        crate::merkle::merkle_root(&self.tx_hashes())
    }

    /// Tip descriptor for this block.
    pub fn tip(&self) -> ChainTip {
        ChainTip {
            index: self.header.index,
            hash: self.hash(),
        }
    }
}

/// The most recently committed block.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChainTip {
    pub index: u64,
    pub hash: Hash256,
}

/// An unspent transaction output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub output: TxOutput,
    /// Height of the block that created this output.
    pub block_height: u64,
    /// Whether this output came from a coinbase.
    pub is_coinbase: bool,
}

impl Utxo {
    pub fn amount(&self) -> u64 {
        self.output.amount
    }

    pub fn address(&self) -> &Address {
        &self.output.address
    }

    /// Coinbase outputs need `maturity` blocks on top; others are always mature.
    pub fn is_mature(&self, current_height: u64, maturity: u64) -> bool {
        !self.is_coinbase || current_height.saturating_sub(self.block_height) >= maturity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Network;
    use crate::policy::COIN;

    fn addr(seed: u8) -> Address {
        Address::from_hash160(Hash160([seed; 20]), Network::Testnet)
    }

    fn sample_transfer() -> TransferTx {
        TransferTx {
            inputs: vec![TxInput::unsigned(OutPoint::new(Hash256([0x11; 32]), 0))],
            outputs: vec![TxOutput::to(addr(0xAA), 10 * COIN)],
            timestamp: 1_700_000_000,
        }
    }

    fn sample_coinbase(height: u64) -> CoinbaseTx {
        CoinbaseTx {
            outputs: vec![TxOutput::to(addr(0xBB), 50 * COIN)],
            height,
            timestamp: 1_700_000_000,
        }
    }

    // --- Hash256 ---

    #[test]
    fn hash256_zero_is_zero() {
        assert!(Hash256::ZERO.is_zero());
        assert_eq!(Hash256::ZERO, Hash256::default());
        assert!(!Hash256([1; 32]).is_zero());
    }

    #[test]
    fn hash256_display_hex() {
        let s = Hash256([0xAB; 32]).to_string();
        assert_eq!(s.len(), 64);
        assert!(s.starts_with("abab"));
    }

    // --- OutPoint ---

    #[test]
    fn outpoint_display() {
        let op = OutPoint::new(Hash256([0xFF; 32]), 3);
        assert!(op.to_string().ends_with(":3"));
    }

    #[test]
    fn outpoint_orders_by_hash_then_index() {
        let a = OutPoint::new(Hash256([1; 32]), 5);
        let b = OutPoint::new(Hash256([2; 32]), 0);
        let c = OutPoint::new(Hash256([2; 32]), 1);
        assert!(a < b);
        assert!(b < c);
    }

    // --- Outputs ---

    #[test]
    fn output_to_sets_matching_script() {
        let out = TxOutput::to(addr(7), 5);
        assert!(out.script_matches_address());
        let forged = TxOutput {
            locking_script: LockingScript::PayToPubkeyHash(Hash160([8; 20])),
            ..out
        };
        assert!(!forged.script_matches_address());
    }

    // --- Transaction hash ---

    #[test]
    fn hash_is_deterministic() {
        let tx = Transaction::Transfer(sample_transfer());
        assert_eq!(tx.hash(), tx.clone().hash());
    }

    #[test]
    fn hash_ignores_signature_material() {
        let mut a = sample_transfer();
        let before = a.hash();
        a.inputs[0].signature = vec![9; 64];
        a.inputs[0].public_key = vec![3; 32];
        assert_eq!(a.hash(), before);
    }

    #[test]
    fn hash_commits_to_sequence_and_timestamp() {
        let base = sample_transfer();
        let mut seq = base.clone();
        seq.inputs[0].sequence = 0;
        let mut ts = base.clone();
        ts.timestamp += 1;
        assert_ne!(base.hash(), seq.hash());
        assert_ne!(base.hash(), ts.hash());
    }

    #[test]
    fn hash_commits_to_type_tag() {
        let cb = sample_coinbase(0);
        let transfer = TransferTx {
            inputs: vec![],
            outputs: cb.outputs.clone(),
            timestamp: cb.timestamp,
        };
        assert_ne!(cb.hash(), transfer.hash());
    }

    #[test]
    fn coinbase_hash_differs_by_height() {
        assert_ne!(sample_coinbase(1).hash(), sample_coinbase(2).hash());
    }

    #[test]
    fn canonical_layout_lengths() {
        let tx = sample_transfer();
        // tag + count + 1 input(40) + count + 1 output(50) + timestamp
        assert_eq!(tx.canonical_bytes().len(), 1 + 4 + 40 + 4 + 50 + 8);
        let cb = sample_coinbase(0);
        assert_eq!(cb.canonical_bytes().len(), 1 + 8 + 4 + 50 + 8);
    }

    #[test]
    fn size_includes_signature_material() {
        let mut tx = sample_transfer();
        let bare = Transaction::Transfer(tx.clone()).size();
        tx.inputs[0].signature = vec![0; 64];
        tx.inputs[0].public_key = vec![0; 32];
        assert_eq!(Transaction::Transfer(tx).size(), bare + 96);
    }

    #[test]
    fn total_output_detects_overflow() {
        let tx = Transaction::Transfer(TransferTx {
            inputs: vec![],
            outputs: vec![TxOutput::to(addr(1), u64::MAX), TxOutput::to(addr(2), 1)],
            timestamp: 0,
        });
        assert_eq!(tx.total_output(), None);
    }

    #[test]
    fn coinbase_has_no_inputs() {
        let tx = Transaction::Coinbase(sample_coinbase(0));
        assert!(tx.is_coinbase());
        assert!(tx.inputs().is_empty());
        assert_eq!(tx.spent_outpoints().count(), 0);
    }

    // --- BlockHeader ---

    fn sample_header() -> BlockHeader {
        BlockHeader {
            index: 1,
            previous_hash: Hash256([0x22; 32]),
            merkle_root: Hash256([0x33; 32]),
            timestamp: 1_700_000_000,
            difficulty: 8,
            nonce: 0,
        }
    }

    #[test]
    fn header_hash_changes_with_nonce() {
        let h = sample_header();
        let mut h2 = h.clone();
        h2.nonce = 1;
        assert_ne!(h.hash(), h2.hash());
    }

    #[test]
    fn header_hash_is_double_sha256() {
        let h = sample_header();
        let mut data = Vec::new();
        data.extend_from_slice(&h.index.to_le_bytes());
        data.extend_from_slice(h.previous_hash.as_bytes());
        data.extend_from_slice(h.merkle_root.as_bytes());
        data.extend_from_slice(&h.timestamp.to_le_bytes());
        data.extend_from_slice(&h.difficulty.to_le_bytes());
        data.extend_from_slice(&h.nonce.to_le_bytes());
        let expected: [u8; 32] = Sha256::digest(Sha256::digest(&data)).into();
        assert_eq!(h.hash(), Hash256(expected));
    }

    // --- Utxo ---

    #[test]
    fn coinbase_maturity() {
        let utxo = Utxo {
            outpoint: OutPoint::new(Hash256([1; 32]), 0),
            output: TxOutput::to(addr(1), 50 * COIN),
            block_height: 10,
            is_coinbase: true,
        };
        assert!(!utxo.is_mature(109, 100));
        assert!(utxo.is_mature(110, 100));
        let regular = Utxo { is_coinbase: false, ..utxo };
        assert!(regular.is_mature(10, 100));
    }
}
