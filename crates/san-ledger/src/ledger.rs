//! The ledger service.
//!
//! [`Ledger`] owns the committed UTXO set and chain tip behind a `RwLock`,
//! and the mempool, persistence store, and balance cache behind mutexes.
//! Locks are always taken in the order chain, mempool, store, cache.
//!
//! Transaction validation and balance queries share the chain read lock.
//! `submit_block` holds the write lock from validation through persistence
//! and the in-memory apply, so no reader ever sees a half-applied block.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use san_core::address::Address;
use san_core::block::{
    assemble, next_position, validate_and_stage, AssemblyParams, ValidatedBlock,
};
use san_core::error::ValidationError;
use san_core::mempool::{Admitted, Mempool, Removed};
use san_core::raw::RawTransaction;
use san_core::traits::{ChainPolicy, ChainStore};
use san_core::types::{Block, ChainTip, Hash256, Transaction, Utxo};
use san_core::utxo_set::{UtxoSet, UtxoStats};
use san_core::validation::{validate_transaction, ValidatedTx, ValidationContext};

use crate::balance_cache::{BalanceCache, Mismatch};
use crate::config::LedgerConfig;
use crate::error::LedgerServiceError;

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

struct ChainState {
    utxos: UtxoSet,
    tip: Option<ChainTip>,
}

/// Outcome of a committed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockConnected {
    pub block: ValidatedBlock,
    /// Pool entries dropped because the block included or conflicted with them.
    pub removed: Vec<Removed>,
    /// Cached balances dropped.
    pub invalidated: usize,
}

pub struct Ledger<S: ChainStore> {
    chain: RwLock<ChainState>,
    mempool: Mutex<Mempool>,
    store: Mutex<S>,
    cache: Mutex<BalanceCache>,
    policy: Box<dyn ChainPolicy>,
    config: LedgerConfig,
}

impl<S: ChainStore> Ledger<S> {
    /// Open a ledger over `store` using the policy described by `config`.
    pub fn open(store: S, config: LedgerConfig) -> Result<Self, LedgerServiceError> {
        let policy = Box::new(config.policy());
        Self::with_policy(store, config, policy)
    }

    /// Open with an explicit consensus policy.
    ///
    /// The committed UTXO set and tip are rebuilt from the store.
    pub fn with_policy(
        store: S,
        config: LedgerConfig,
        policy: Box<dyn ChainPolicy>,
    ) -> Result<Self, LedgerServiceError> {
        config.validate()?;
        let utxos = store.load_utxo_set()?;
        let tip = store.load_chain_tip()?.map(|b| b.tip());
        info!(
            height = ?tip.map(|t| t.index),
            utxos = utxos.len(),
            network = ?config.network,
            "ledger opened"
        );

        Ok(Self {
            chain: RwLock::new(ChainState { utxos, tip }),
            mempool: Mutex::new(Mempool::new(config.mempool_max_count)),
            store: Mutex::new(store),
            cache: Mutex::new(BalanceCache::with_capacity(config.balance_cache_capacity)),
            policy,
            config,
        })
    }

    // --- Transactions ---

    /// Validate `tx` and admit it to the mempool.
    ///
    /// Inputs may spend committed outputs or outputs of pool entries. The
    /// conflict check and insert happen under one mempool lock, so two
    /// concurrent spends of the same outpoint cannot both be admitted.
    pub fn submit_transaction(
        &self,
        tx: &Transaction,
        claimed_hash: Option<&Hash256>,
        now: u64,
    ) -> Result<Admitted, LedgerServiceError> {
        let result = self.admit(tx, claimed_hash, now);
        match &result {
            Ok(admitted) => {
                for removed in &admitted.evicted {
                    debug!(tx = %removed.hash, reason = ?removed.reason, "evicted from mempool");
                }
            }
            Err(e) => debug!(tx = %tx.hash(), error = %e, "transaction rejected"),
        }
        result
    }

    fn admit(
        &self,
        tx: &Transaction,
        claimed_hash: Option<&Hash256>,
        now: u64,
    ) -> Result<Admitted, LedgerServiceError> {
        if tx.is_coinbase() {
            return Err(ValidationError::InvalidCoinbase(
                "coinbase transactions are only valid inside blocks".into(),
            )
            .into());
        }

        let chain = self.chain.read();
        let mut pool = self.mempool.lock();
        let (height, _) = next_position(chain.tip.as_ref());
        let ctx = ValidationContext::for_height(self.policy.as_ref(), height);
        let validated = validate_transaction(tx, claimed_hash, &chain.utxos, &*pool, &ctx)?;
        let fee = validated.fee;
        let admitted = pool.admit(validated, &chain.utxos, now)?;
        info!(tx = %admitted.hash, fee, pool = pool.len(), "transaction admitted");
        Ok(admitted)
    }

    /// Decode bincode bytes from the network boundary and submit them.
    pub fn submit_raw(&self, bytes: &[u8], now: u64) -> Result<Admitted, LedgerServiceError> {
        let raw = RawTransaction::from_bytes(bytes)?;
        let (tx, claimed) = raw.into_transaction()?;
        self.submit_transaction(&tx, claimed.as_ref(), now)
    }

    /// Drop pool entries older than the configured maximum age.
    pub fn expire_mempool(&self, now: u64) -> Vec<Removed> {
        let removed = self.mempool.lock().expire(now, self.config.mempool_max_age);
        if !removed.is_empty() {
            info!(count = removed.len(), "expired mempool entries");
        }
        removed
    }

    /// Validated pool contents in priority order.
    pub fn mempool_snapshot(&self) -> Vec<ValidatedTx> {
        self.mempool.lock().snapshot()
    }

    pub fn mempool_len(&self) -> usize {
        self.mempool.lock().len()
    }

    // --- Blocks ---

    /// Assemble a candidate block paying `miner`. The caller searches the nonce.
    pub fn block_template(&self, miner: &Address, timestamp: u64) -> Result<Block, LedgerServiceError> {
        let chain = self.chain.read();
        let pool = self.mempool.lock();
        let (height, _) = next_position(chain.tip.as_ref());
        let params = AssemblyParams {
            coinbase_reward: self.policy.block_reward(height),
            miner_address: miner,
            max_tx_count: self.config.max_block_txs,
            timestamp,
            difficulty: self.policy.difficulty(height),
        };
        let block = assemble(&pool, chain.tip.as_ref(), &params)?;
        debug!(height, txs = block.transactions.len(), "assembled block template");
        Ok(block)
    }

    /// Validate, persist, and apply `block` as one atomic step.
    ///
    /// On any failure, including a persistence failure, the UTXO set, tip,
    /// mempool, and cache are unchanged.
    pub fn submit_block(&self, block: &Block) -> Result<BlockConnected, LedgerServiceError> {
        let mut chain = self.chain.write();

        let (validated, delta) = validate_and_stage(
            block,
            &chain.utxos,
            chain.tip.as_ref(),
            self.policy.as_ref(),
        )
        .inspect_err(|e| warn!(index = block.index(), error = %e, "block rejected"))?;

        self.store
            .lock()
            .persist_block(block, &delta)
            .inspect_err(|e| warn!(index = block.index(), error = %e, "block persist failed"))?;

        chain.utxos.apply_delta(&delta).map_err(|e| {
            LedgerServiceError::Inconsistent(format!(
                "block {} persisted but failed to apply: {e}",
                validated.height
            ))
        })?;
        chain.tip = Some(validated.tip());

        let removed = self.mempool.lock().remove_confirmed_block(block);
        let invalidated = self.cache.lock().invalidate(delta.touched_addresses().iter());

        info!(
            height = validated.height,
            hash = %validated.hash,
            txs = validated.tx_count,
            fees = validated.total_fees,
            removed = removed.len(),
            "block connected"
        );

        Ok(BlockConnected {
            block: validated,
            removed,
            invalidated,
        })
    }

    // --- Queries ---

    /// Committed balance of `address`, served from the cache when possible.
    pub fn balance(&self, address: &Address) -> Result<u64, LedgerServiceError> {
        let chain = self.chain.read();
        let balance = self.cache.lock().get_or_compute(address, &chain.utxos)?;
        Ok(balance)
    }

    /// Committed unspent outputs of `address`, largest first.
    pub fn list_by_address(&self, address: &Address) -> Vec<Utxo> {
        let chain = self.chain.read();
        chain
            .utxos
            .list_by_address(address)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn chain_tip(&self) -> Option<ChainTip> {
        self.chain.read().tip
    }

    /// Height the next block must carry.
    pub fn next_height(&self) -> u64 {
        next_position(self.chain.read().tip.as_ref()).0
    }

    pub fn utxo_stats(&self) -> Result<UtxoStats, LedgerServiceError> {
        Ok(self.chain.read().utxos.stats()?)
    }

    /// Number of cached balances.
    pub fn balance_cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Compare every cached balance with a fresh sum over the UTXO set.
    pub fn verify_balance_cache(&self) -> Result<Vec<Mismatch>, LedgerServiceError> {
        let chain = self.chain.read();
        let mismatches = self.cache.lock().verify_consistency(&chain.utxos)?;
        if !mismatches.is_empty() {
            warn!(count = mismatches.len(), "balance cache disagrees with utxo set");
        }
        Ok(mismatches)
    }

    pub fn policy(&self) -> &dyn ChainPolicy {
        self.policy.as_ref()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Run `f` with exclusive access to the store.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.store.lock())
    }

    /// Consume the ledger, returning its store.
    pub fn into_store(self) -> S {
        self.store.into_inner()
    }
}

impl<S: ChainStore> std::fmt::Debug for Ledger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("tip", &self.chain_tip())
            .field("mempool", &self.mempool_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use san_core::address::Network;
    use san_core::block::mine_block;
    use san_core::chain_store::MemoryChainStore;
    use san_core::crypto::{sign_input, KeyPair};
    use san_core::error::{ChainError, ConflictError, SanError};
    use san_core::mempool::RemovalReason;
    use san_core::policy::{COIN, MAX_TX_SIZE};
    use san_core::types::{OutPoint, TransferTx, TxInput, TxOutput};

    fn ledger() -> Ledger<MemoryChainStore> {
        Ledger::open(MemoryChainStore::new(), LedgerConfig::regtest()).unwrap()
    }

    fn mine(ledger: &Ledger<MemoryChainStore>, miner: &Address, ts: u64) -> BlockConnected {
        let mut block = ledger.block_template(miner, ts).unwrap();
        assert!(mine_block(&mut block, 1_000_000));
        ledger.submit_block(&block).unwrap()
    }

    fn spend(kp: &KeyPair, from: OutPoint, to: Address, amount: u64, ts: u64) -> Transaction {
        let mut tx = TransferTx {
            inputs: vec![TxInput::unsigned(from)],
            outputs: vec![TxOutput::to(to, amount)],
            timestamp: ts,
        };
        sign_input(&mut tx, 0, kp).unwrap();
        Transaction::Transfer(tx)
    }

    fn coinbase_outpoint(ledger: &Ledger<MemoryChainStore>, owner: &Address) -> OutPoint {
        ledger.list_by_address(owner)[0].outpoint
    }

    // --- Opening ---

    #[test]
    fn empty_store_has_no_tip() {
        let ledger = ledger();
        assert_eq!(ledger.chain_tip(), None);
        assert_eq!(ledger.next_height(), 0);
        assert_eq!(ledger.utxo_stats().unwrap().count, 0);
    }

    #[test]
    fn invalid_config_refused() {
        let config = LedgerConfig {
            max_block_txs: 0,
            ..LedgerConfig::regtest()
        };
        assert!(matches!(
            Ledger::open(MemoryChainStore::new(), config),
            Err(LedgerServiceError::InvalidConfig(_))
        ));
    }

    #[test]
    fn reopen_restores_committed_state() {
        let kp = KeyPair::generate();
        let miner = kp.address(Network::Testnet);
        let ledger = ledger();
        mine(&ledger, &miner, 1);
        mine(&ledger, &miner, 2);
        let tip = ledger.chain_tip();
        let stats = ledger.utxo_stats().unwrap();

        let reopened = Ledger::open(ledger.into_store(), LedgerConfig::regtest()).unwrap();
        assert_eq!(reopened.chain_tip(), tip);
        assert_eq!(reopened.utxo_stats().unwrap(), stats);
        assert_eq!(reopened.balance(&miner).unwrap(), 100 * COIN);
    }

    // --- Blocks ---

    #[test]
    fn genesis_pays_reward() {
        let kp = KeyPair::generate();
        let miner = kp.address(Network::Testnet);
        let ledger = ledger();
        let connected = mine(&ledger, &miner, 1);

        assert_eq!(connected.block.height, 0);
        assert_eq!(connected.block.coinbase_value, 50 * COIN);
        assert_eq!(ledger.chain_tip().map(|t| t.index), Some(0));
        assert_eq!(ledger.balance(&miner).unwrap(), 50 * COIN);
        assert_eq!(ledger.with_store(|s| s.height()), 1);
    }

    #[test]
    fn stale_block_rejected_without_side_effects() {
        let kp = KeyPair::generate();
        let miner = kp.address(Network::Testnet);
        let ledger = ledger();
        let mut genesis = ledger.block_template(&miner, 1).unwrap();
        assert!(mine_block(&mut genesis, 1_000_000));
        ledger.submit_block(&genesis).unwrap();

        let err = ledger.submit_block(&genesis).unwrap_err();
        assert!(matches!(
            err,
            LedgerServiceError::Chain(ChainError::ForkOrStale { .. })
        ));
        assert_eq!(ledger.with_store(|s| s.height()), 1);
        assert_eq!(ledger.balance(&miner).unwrap(), 50 * COIN);
    }

    #[test]
    fn persist_failure_leaves_state_untouched() {
        let kp = KeyPair::generate();
        let miner = kp.address(Network::Testnet);
        let ledger = ledger();
        mine(&ledger, &miner, 1);
        assert_eq!(ledger.balance(&miner).unwrap(), 50 * COIN);

        let mut block = ledger.block_template(&miner, 2).unwrap();
        assert!(mine_block(&mut block, 1_000_000));
        ledger.with_store(|s| s.fail_next_persist());
        let err = ledger.submit_block(&block).unwrap_err();
        assert!(matches!(
            err,
            LedgerServiceError::Store(SanError::Storage(_))
        ));

        assert_eq!(ledger.chain_tip().map(|t| t.index), Some(0));
        assert_eq!(ledger.balance(&miner).unwrap(), 50 * COIN);
        assert!(ledger.verify_balance_cache().unwrap().is_empty());

        ledger.submit_block(&block).unwrap();
        assert_eq!(ledger.balance(&miner).unwrap(), 100 * COIN);
    }

    #[test]
    fn transfer_flows_through_pool_into_block() {
        let alice = KeyPair::generate();
        let alice_addr = alice.address(Network::Testnet);
        let bob = KeyPair::generate().address(Network::Testnet);
        let ledger = ledger();
        mine(&ledger, &alice_addr, 1);

        let op = coinbase_outpoint(&ledger, &alice_addr);
        let tx = spend(&alice, op, bob, 50 * COIN - 10_000, 2);
        let admitted = ledger.submit_transaction(&tx, None, 2).unwrap();
        assert_eq!(admitted.hash, tx.hash());
        assert_eq!(ledger.mempool_len(), 1);
        assert_eq!(ledger.mempool_snapshot()[0].fee, 10_000);

        let connected = mine(&ledger, &alice_addr, 3);
        assert_eq!(connected.block.total_fees, 10_000);
        assert_eq!(
            connected.removed,
            vec![Removed {
                hash: tx.hash(),
                reason: RemovalReason::Included
            }]
        );
        assert_eq!(ledger.mempool_len(), 0);
        assert_eq!(ledger.balance(&bob).unwrap(), 50 * COIN - 10_000);
        assert_eq!(ledger.balance(&alice_addr).unwrap(), 50 * COIN + 10_000);
        assert!(ledger.verify_balance_cache().unwrap().is_empty());
    }

    #[test]
    fn cached_balance_refreshed_after_block() {
        let kp = KeyPair::generate();
        let miner = kp.address(Network::Testnet);
        let ledger = ledger();
        assert_eq!(ledger.balance(&miner).unwrap(), 0);
        assert_eq!(mine(&ledger, &miner, 1).invalidated, 0);
        assert_eq!(ledger.balance(&miner).unwrap(), 50 * COIN);
        assert_eq!(mine(&ledger, &miner, 2).invalidated, 1);
        assert_eq!(ledger.balance(&miner).unwrap(), 100 * COIN);
    }

    #[test]
    fn unfunded_lookups_do_not_grow_cache() {
        let kp = KeyPair::generate();
        let miner = kp.address(Network::Testnet);
        let ledger = Ledger::open(
            MemoryChainStore::new(),
            LedgerConfig {
                balance_cache_capacity: 8,
                ..LedgerConfig::regtest()
            },
        )
        .unwrap();
        mine(&ledger, &miner, 1);

        for _ in 0..2_000 {
            let stranger = KeyPair::generate().address(Network::Testnet);
            assert_eq!(ledger.balance(&stranger).unwrap(), 0);
        }
        assert_eq!(ledger.balance(&miner).unwrap(), 50 * COIN);
        assert_eq!(ledger.balance_cache_len(), 1);
        assert!(ledger.verify_balance_cache().unwrap().is_empty());
    }

    // --- Admission ---

    #[test]
    fn second_spend_conflicts_in_mempool() {
        let alice = KeyPair::generate();
        let alice_addr = alice.address(Network::Testnet);
        let ledger = ledger();
        mine(&ledger, &alice_addr, 1);
        let op = coinbase_outpoint(&ledger, &alice_addr);

        let first = spend(&alice, op, KeyPair::generate().address(Network::Testnet), COIN, 2);
        let second = spend(&alice, op, KeyPair::generate().address(Network::Testnet), COIN, 3);
        ledger.submit_transaction(&first, None, 2).unwrap();
        let err = ledger.submit_transaction(&second, None, 3).unwrap_err();
        assert!(matches!(
            err,
            LedgerServiceError::Conflict(ConflictError::DoubleSpendInMempool { outpoint, existing })
                if outpoint == op && existing == first.hash()
        ));
        assert_eq!(ledger.mempool_len(), 1);
    }

    #[test]
    fn chained_spend_admitted_and_mined_in_order() {
        let alice = KeyPair::generate();
        let alice_addr = alice.address(Network::Testnet);
        let carol = KeyPair::generate();
        let carol_addr = carol.address(Network::Testnet);
        let ledger = ledger();
        mine(&ledger, &alice_addr, 1);
        let op = coinbase_outpoint(&ledger, &alice_addr);

        let parent = spend(&alice, op, carol_addr, 10 * COIN, 2);
        let child = spend(
            &carol,
            OutPoint::new(parent.hash(), 0),
            alice_addr,
            10 * COIN - 5_000,
            3,
        );
        ledger.submit_transaction(&parent, None, 2).unwrap();
        ledger.submit_transaction(&child, None, 3).unwrap();

        let block = ledger.block_template(&alice_addr, 4).unwrap();
        let hashes = block.tx_hashes();
        let pos = |h: Hash256| hashes.iter().position(|x| *x == h).unwrap();
        assert!(pos(parent.hash()) < pos(child.hash()));
    }

    #[test]
    fn coinbase_refused_by_pool() {
        let ledger = ledger();
        let miner = KeyPair::generate().address(Network::Testnet);
        let block = ledger.block_template(&miner, 1).unwrap();
        let err = ledger
            .submit_transaction(&block.transactions[0], None, 1)
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerServiceError::Validation(ValidationError::InvalidCoinbase(_))
        ));
    }

    #[test]
    fn raw_submission_checks_claimed_hash() {
        let alice = KeyPair::generate();
        let alice_addr = alice.address(Network::Testnet);
        let ledger = ledger();
        mine(&ledger, &alice_addr, 1);
        let op = coinbase_outpoint(&ledger, &alice_addr);
        let tx = spend(&alice, op, alice_addr, COIN, 2);

        let mut raw = RawTransaction::from_transaction(&tx);
        raw.hash = Some(Hash256([0xEE; 32]));
        let err = ledger.submit_raw(&raw.to_bytes().unwrap(), 2).unwrap_err();
        assert!(matches!(
            err,
            LedgerServiceError::Validation(ValidationError::HashMismatch { .. })
        ));

        let good = RawTransaction::from_transaction(&tx).to_bytes().unwrap();
        assert_eq!(ledger.submit_raw(&good, 2).unwrap().hash, tx.hash());
    }

    #[test]
    fn garbage_bytes_malformed() {
        let ledger = ledger();
        assert!(matches!(
            ledger.submit_raw(&[0xFF, 0x01, 0x02], 0),
            Err(LedgerServiceError::Validation(ValidationError::Malformed(_)))
        ));
    }

    #[test]
    fn oversized_raw_payload_rejected_before_validation() {
        let ledger = ledger();
        let mut forged = vec![1, 0, 253];
        forged.extend_from_slice(&(1u64 << 40).to_le_bytes());
        assert!(matches!(
            ledger.submit_raw(&forged, 0),
            Err(LedgerServiceError::Validation(ValidationError::Malformed(_)))
        ));
        assert!(matches!(
            ledger.submit_raw(&vec![0u8; MAX_TX_SIZE + 1], 0),
            Err(LedgerServiceError::Validation(ValidationError::Malformed(_)))
        ));
        assert_eq!(ledger.mempool_len(), 0);
    }

    #[test]
    fn expiry_uses_configured_age() {
        let alice = KeyPair::generate();
        let alice_addr = alice.address(Network::Testnet);
        let ledger = ledger();
        mine(&ledger, &alice_addr, 1);
        let op = coinbase_outpoint(&ledger, &alice_addr);
        let tx = spend(&alice, op, alice_addr, COIN, 2);
        ledger.submit_transaction(&tx, None, 100).unwrap();

        let max_age = ledger.config().mempool_max_age;
        assert!(ledger.expire_mempool(99 + max_age).is_empty());
        let removed = ledger.expire_mempool(100 + max_age);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].reason, RemovalReason::Expired);
        assert_eq!(ledger.mempool_len(), 0);
    }
}
