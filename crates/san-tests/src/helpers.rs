//! Shared helpers for integration tests.

use san_core::address::{Address, Network};
use san_core::block::mine_block;
use san_core::chain_store::MemoryChainStore;
use san_core::crypto::{sign_input, KeyPair};
use san_core::types::{OutPoint, Transaction, TransferTx, TxInput, TxOutput, Utxo};
use san_ledger::{BlockConnected, Ledger, LedgerConfig};

/// Ledger over an empty in-memory store with regtest settings.
pub fn regtest_ledger() -> Ledger<MemoryChainStore> {
    Ledger::open(MemoryChainStore::new(), LedgerConfig::regtest())
        .expect("regtest ledger")
}

/// Deterministic keypair from a seed byte.
pub fn keypair(seed: u8) -> KeyPair {
    KeyPair::from_secret_bytes([seed; 32])
}

pub fn address(kp: &KeyPair) -> Address {
    kp.address(Network::Testnet)
}

/// Assemble, mine, and commit the next block paying `miner`.
pub fn mine(ledger: &Ledger<MemoryChainStore>, miner: &Address, timestamp: u64) -> BlockConnected {
    let mut block = ledger
        .block_template(miner, timestamp)
        .expect("block template");
    assert!(mine_block(&mut block, 10_000_000), "no nonce found");
    ledger
        .submit_block(&block)
        .expect("submit mined block")
}

/// A transfer spending `inputs`, all owned by `owner`, signed input by input.
pub fn signed_transfer(
    owner: &KeyPair,
    inputs: &[OutPoint],
    outputs: &[(Address, u64)],
    timestamp: u64,
) -> Transaction {
    let mut tx = TransferTx {
        inputs: inputs.iter().copied().map(TxInput::unsigned).collect(),
        outputs: outputs.iter().map(|(a, v)| TxOutput::to(*a, *v)).collect(),
        timestamp,
    };
    for i in 0..tx.inputs.len() {
        sign_input(&mut tx, i, owner).expect("input index in range");
    }
    Transaction::Transfer(tx)
}

/// A committed output owned by `kp`, for building standalone UTXO sets.
pub fn owned_utxo(kp: &KeyPair, outpoint: OutPoint, amount: u64, block_height: u64) -> Utxo {
    Utxo {
        outpoint,
        output: TxOutput::to(address(kp), amount),
        block_height,
        is_coinbase: false,
    }
}

/// Mine one block per owner, then one more so every reward is mature.
pub fn funded_ledger(owners: &[&KeyPair]) -> Ledger<MemoryChainStore> {
    let ledger = regtest_ledger();
    let mut ts = 1;
    for kp in owners {
        mine(&ledger, &address(kp), ts);
        ts += 1;
    }
    mine(&ledger, &address(&keypair(0xFF)), ts);
    ledger
}
