//! End-to-end ledger scenarios.
//!
//! Each test drives the public API of `san-core`, `san-wallet`, and
//! `san-ledger` together the way a node and its wallet would.

use san_core::address::Network;
use san_core::error::{ChainError, ConflictError, ValidationError};
use san_core::policy::{StandardPolicy, COIN, MIN_TX_FEE};
use san_core::traits::NoPending;
use san_core::types::{Hash256, OutPoint, Transaction, TxOutput, Utxo};
use san_core::utxo_set::UtxoSet;
use san_core::validation::{validate_transaction, ValidationContext};
use san_ledger::LedgerServiceError;
use san_tests::helpers::*;
use san_wallet::{CoinSelector, Seed, Wallet};

// ---------------------------------------------------------------------------
// Coin selection
// ---------------------------------------------------------------------------

#[test]
fn selection_takes_both_when_largest_is_short() {
    let owner = keypair(1);
    let h = Hash256([0x10; 32]);
    let utxos = [
        owned_utxo(&owner, OutPoint::new(h, 0), 10, 1),
        owned_utxo(&owner, OutPoint::new(h, 1), 5, 1),
    ];
    let selection = CoinSelector::select(&utxos, 12, 1).unwrap();
    assert_eq!(selection.selected.len(), 2);
    assert_eq!(selection.selected[0].amount(), 10);
    assert_eq!(selection.total, 15);
    assert_eq!(selection.change, 2);
}

// ---------------------------------------------------------------------------
// Signatures bind the spent outpoint
// ---------------------------------------------------------------------------

#[test]
fn signature_for_one_output_fails_on_another() {
    let alice = keypair(1);
    let h = Hash256([0x20; 32]);
    let set = UtxoSet::from_utxos([
        owned_utxo(&alice, OutPoint::new(h, 0), 10 * COIN, 0),
        owned_utxo(&alice, OutPoint::new(h, 1), 10 * COIN, 0),
    ]);
    let ctx = ValidationContext::for_height(&StandardPolicy::regtest(), 1);

    let signed = signed_transfer(
        &alice,
        &[OutPoint::new(h, 0)],
        &[(address(&keypair(2)), 9 * COIN)],
        1,
    );
    assert!(validate_transaction(&signed, None, &set, &NoPending, &ctx).is_ok());

    let Transaction::Transfer(mut replayed) = signed else {
        panic!("expected transfer");
    };
    replayed.inputs[0].previous_output.index = 1;
    assert_eq!(
        validate_transaction(&Transaction::Transfer(replayed), None, &set, &NoPending, &ctx),
        Err(ValidationError::InvalidSignature { index: 0 })
    );
}

#[test]
fn stranger_cannot_spend() {
    let alice = keypair(1);
    let mallory = keypair(9);
    let ledger = funded_ledger(&[&alice]);
    let op = ledger.list_by_address(&address(&alice))[0].outpoint;

    let theft = signed_transfer(&mallory, &[op], &[(address(&mallory), COIN)], 5);
    assert!(matches!(
        ledger.submit_transaction(&theft, None, 5),
        Err(LedgerServiceError::Validation(
            ValidationError::InvalidSignature { index: 0 }
        ))
    ));
}

// ---------------------------------------------------------------------------
// Double spends
// ---------------------------------------------------------------------------

#[test]
fn second_spend_of_pooled_outpoint_conflicts() {
    let alice = keypair(1);
    let ledger = funded_ledger(&[&alice]);
    let op = ledger.list_by_address(&address(&alice))[0].outpoint;

    let to_bob = signed_transfer(&alice, &[op], &[(address(&keypair(2)), COIN)], 10);
    let to_carol = signed_transfer(&alice, &[op], &[(address(&keypair(3)), COIN)], 11);
    ledger.submit_transaction(&to_bob, None, 10).unwrap();

    match ledger.submit_transaction(&to_carol, None, 11) {
        Err(LedgerServiceError::Conflict(ConflictError::DoubleSpendInMempool {
            outpoint,
            existing,
        })) => {
            assert_eq!(outpoint, op);
            assert_eq!(existing, to_bob.hash());
        }
        other => panic!("expected mempool double spend, got {other:?}"),
    }
}

#[test]
fn spend_of_confirmed_outpoint_is_unknown() {
    let alice = keypair(1);
    let ledger = funded_ledger(&[&alice]);
    let op = ledger.list_by_address(&address(&alice))[0].outpoint;

    let first = signed_transfer(&alice, &[op], &[(address(&keypair(2)), COIN)], 10);
    ledger.submit_transaction(&first, None, 10).unwrap();
    mine(&ledger, &address(&keypair(0xFE)), 11);

    let again = signed_transfer(&alice, &[op], &[(address(&keypair(3)), COIN)], 12);
    assert!(matches!(
        ledger.submit_transaction(&again, None, 12),
        Err(LedgerServiceError::Validation(ValidationError::UnknownInput(o))) if o == op
    ));
}

#[test]
fn block_with_double_spend_rejected_whole() {
    let alice = keypair(1);
    let ledger = funded_ledger(&[&alice]);
    let op = ledger.list_by_address(&address(&alice))[0].outpoint;
    let stats_before = ledger.utxo_stats().unwrap();
    let tip_before = ledger.chain_tip();

    let a = signed_transfer(&alice, &[op], &[(address(&keypair(2)), COIN)], 10);
    let b = signed_transfer(&alice, &[op], &[(address(&keypair(3)), COIN)], 11);
    ledger.submit_transaction(&a, None, 10).unwrap();

    let mut block = ledger.block_template(&address(&alice), 12).unwrap();
    block.transactions.push(b);
    block.header.merkle_root = block.compute_merkle_root();
    assert!(san_core::block::mine_block(&mut block, 1_000_000));

    assert!(matches!(
        ledger.submit_block(&block),
        Err(LedgerServiceError::Chain(ChainError::DoubleSpend(o))) if o == op
    ));
    assert_eq!(ledger.utxo_stats().unwrap(), stats_before);
    assert_eq!(ledger.chain_tip(), tip_before);
    assert_eq!(ledger.mempool_len(), 1);
}

// ---------------------------------------------------------------------------
// Coinbase rules
// ---------------------------------------------------------------------------

#[test]
fn overpaying_coinbase_rejected() {
    let miner = address(&keypair(1));
    let ledger = regtest_ledger();
    let mut block = ledger.block_template(&miner, 1).unwrap();
    if let Transaction::Coinbase(cb) = &mut block.transactions[0] {
        cb.outputs[0] = TxOutput::to(miner, cb.outputs[0].amount + 1);
    }
    block.header.merkle_root = block.compute_merkle_root();
    assert!(san_core::block::mine_block(&mut block, 1_000_000));

    assert!(matches!(
        ledger.submit_block(&block),
        Err(LedgerServiceError::Chain(ChainError::Transaction {
            index: 0,
            source: ValidationError::InvalidCoinbase(_)
        }))
    ));
    assert_eq!(ledger.chain_tip(), None);
}

#[test]
fn coinbase_collects_fees() {
    let alice = keypair(1);
    let miner = address(&keypair(7));
    let ledger = funded_ledger(&[&alice]);
    let op = ledger.list_by_address(&address(&alice))[0].outpoint;

    let tx = signed_transfer(
        &alice,
        &[op],
        &[(address(&keypair(2)), 50 * COIN - 25_000)],
        10,
    );
    ledger.submit_transaction(&tx, None, 10).unwrap();
    let connected = mine(&ledger, &miner, 11);

    assert_eq!(connected.block.total_fees, 25_000);
    assert_eq!(ledger.balance(&miner).unwrap(), 50 * COIN + 25_000);
}

#[test]
fn immature_coinbase_rejected_until_confirmed() {
    let alice = keypair(1);
    let config = san_ledger::LedgerConfig {
        coinbase_maturity: 3,
        ..san_ledger::LedgerConfig::regtest()
    };
    let ledger =
        san_ledger::Ledger::open(san_core::chain_store::MemoryChainStore::new(), config).unwrap();
    mine(&ledger, &address(&alice), 1);
    let op = ledger.list_by_address(&address(&alice))[0].outpoint;
    let tx = signed_transfer(&alice, &[op], &[(address(&keypair(2)), COIN)], 2);

    assert!(matches!(
        ledger.submit_transaction(&tx, None, 2),
        Err(LedgerServiceError::Validation(
            ValidationError::ImmatureCoinbase { index: 0 }
        ))
    ));

    mine(&ledger, &address(&keypair(0xFE)), 3);
    mine(&ledger, &address(&keypair(0xFE)), 4);
    assert_eq!(ledger.next_height(), 3);
    ledger.submit_transaction(&tx, None, 5).unwrap();
}

// ---------------------------------------------------------------------------
// Wallet round trip
// ---------------------------------------------------------------------------

fn owned_by(ledger: &san_ledger::Ledger<san_core::chain_store::MemoryChainStore>, wallet: &Wallet) -> Vec<Utxo> {
    wallet
        .addresses()
        .iter()
        .flat_map(|a| ledger.list_by_address(a))
        .collect()
}

#[test]
fn wallet_pays_recipient_and_keeps_change() {
    let ledger = regtest_ledger();
    let mut alice = Wallet::from_seed(Seed::from_bytes([1; 32]), Network::Testnet);
    let mut bob = Wallet::from_seed(Seed::from_bytes([2; 32]), Network::Testnet);
    let alice_addr = alice.next_address();
    let bob_addr = bob.next_address();
    mine(&ledger, &alice_addr, 1);

    alice.scan_utxos(&owned_by(&ledger, &alice));
    let tx = alice
        .send(
            &[(bob_addr, 20 * COIN)],
            ledger.next_height(),
            ledger.policy().coinbase_maturity(),
            2,
        )
        .unwrap();
    ledger.submit_transaction(&tx, None, 2).unwrap();
    mine(&ledger, &address(&keypair(0xFE)), 3);

    bob.scan_utxos(&owned_by(&ledger, &bob));
    alice.scan_utxos(&owned_by(&ledger, &alice));
    let height = ledger.next_height();
    let maturity = ledger.policy().coinbase_maturity();
    assert_eq!(bob.balance(height, maturity).total, 20 * COIN);
    assert_eq!(
        alice.balance(height, maturity).total,
        30 * COIN - MIN_TX_FEE
    );
    assert_eq!(ledger.balance(&bob_addr).unwrap(), 20 * COIN);
    assert!(ledger.verify_balance_cache().unwrap().is_empty());
}

#[test]
fn restored_wallet_sees_same_funds() {
    let ledger = regtest_ledger();
    let mut original = Wallet::create(Network::Testnet);
    let addr = original.next_address();
    mine(&ledger, &addr, 1);

    let mut restored =
        Wallet::from_mnemonic(&original.mnemonic().unwrap(), Network::Testnet).unwrap();
    assert_eq!(restored.next_address(), addr);
    restored.scan_utxos(&owned_by(&ledger, &restored));
    assert_eq!(restored.balance(1, 1).total, 50 * COIN);
}

#[test]
fn wallet_file_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wallet.dat");
    let mut wallet = Wallet::create(Network::Testnet);
    let first = wallet.next_address();
    let second = wallet.next_address();
    wallet.save_to_file(&path, b"hunter2").unwrap();

    let loaded = Wallet::load_from_file(&path, b"hunter2").unwrap();
    assert_eq!(loaded.addresses(), vec![first, second]);
    assert!(Wallet::load_from_file(&path, b"wrong").is_err());
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn reopened_ledger_rejects_replayed_spend() {
    let alice = keypair(1);
    let ledger = funded_ledger(&[&alice]);
    let op = ledger.list_by_address(&address(&alice))[0].outpoint;
    let tx = signed_transfer(&alice, &[op], &[(address(&keypair(2)), COIN)], 10);
    ledger.submit_transaction(&tx, None, 10).unwrap();
    mine(&ledger, &address(&keypair(0xFE)), 11);

    let reopened =
        san_ledger::Ledger::open(ledger.into_store(), san_ledger::LedgerConfig::regtest()).unwrap();
    assert!(reopened.submit_transaction(&tx, None, 12).is_err());
    assert_eq!(reopened.balance(&address(&keypair(2))).unwrap(), COIN);
}

#[test]
fn policy_reward_matches_config() {
    let ledger = regtest_ledger();
    assert_eq!(ledger.policy().block_reward(0), 50 * COIN);
    assert_eq!(ledger.policy().min_fee(), MIN_TX_FEE);
}
