//! Sancoin regtest driver.
//!
//! Opens a ledger over the in-memory store, mines a funding block, pays a
//! second wallet through the mempool, mines that payment, and prints a JSON
//! report of balances and UTXO statistics.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use san_core::address::Address;
use san_core::block::mine_block;
use san_core::chain_store::MemoryChainStore;
use san_core::policy::COIN;
use san_core::types::Utxo;
use san_ledger::config::environment;
use san_ledger::{init_logging, unix_now, Ledger, LedgerConfig, LogFormat};
use san_wallet::Wallet;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "san-node",
    version,
    about = "Run a Sancoin regtest ledger through a mine-transfer-mine cycle"
)]
struct Args {
    /// TOML config file layered over the regtest defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Amount to transfer, in whole coins
    #[arg(long, default_value_t = 10)]
    amount: u64,

    /// Extra empty blocks to mine after the transfer
    #[arg(long, default_value_t = 0)]
    extra_blocks: u64,

    /// Upper bound of the nonce search per block
    #[arg(long, default_value_t = 50_000_000)]
    max_nonce: u64,

    /// Save the paying wallet, encrypted with this password, under the data dir
    #[arg(long)]
    save_wallet: Option<String>,
}

impl Args {
    fn into_config(self) -> Result<(LedgerConfig, Self)> {
        let mut cfg = LedgerConfig::load_layers(
            LedgerConfig::regtest(),
            self.config.as_deref(),
            environment(),
        )
        .context("failed to load configuration")?;
        if let Some(level) = &self.log_level {
            cfg.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            cfg.log_format = format;
        }
        Ok((cfg, self))
    }
}

fn main() -> Result<()> {
    let (config, args) = Args::parse().into_config()?;
    init_logging(&config.log_level, config.log_format).context("failed to initialise logging")?;

    info!("Sancoin regtest driver v{}", env!("CARGO_PKG_VERSION"));
    info!(network = ?config.network, difficulty = config.difficulty_bits, "configuration loaded");

    let ledger =
        Ledger::open(MemoryChainStore::new(), config.clone()).context("failed to open ledger")?;

    let mut alice = Wallet::create(config.network);
    let mut bob = Wallet::create(config.network);
    let alice_addr = alice.next_address();
    let bob_addr = bob.next_address();
    let miner_addr = Wallet::create(config.network).next_address();

    mine_next(&ledger, &alice_addr, args.max_nonce)?;
    while ledger.next_height() < config.coinbase_maturity {
        mine_next(&ledger, &miner_addr, args.max_nonce)?;
    }

    alice.scan_utxos(&owned_by(&ledger, &alice));
    let amount = args
        .amount
        .checked_mul(COIN)
        .context("transfer amount overflows")?;
    let tx = alice
        .send(
            &[(bob_addr, amount)],
            ledger.next_height(),
            config.coinbase_maturity,
            unix_now(),
        )
        .context("failed to build transfer")?;
    let admitted = ledger
        .submit_transaction(&tx, None, unix_now())
        .context("transfer rejected")?;
    info!(tx = %admitted.hash, amount, "transfer admitted");

    mine_next(&ledger, &miner_addr, args.max_nonce)?;
    for _ in 0..args.extra_blocks {
        mine_next(&ledger, &miner_addr, args.max_nonce)?;
    }

    alice.scan_utxos(&owned_by(&ledger, &alice));
    bob.scan_utxos(&owned_by(&ledger, &bob));

    if let Some(password) = &args.save_wallet {
        let path = config.wallet_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        alice
            .save_to_file(&path, password.as_bytes())
            .context("failed to save wallet")?;
        info!(path = %path.display(), "wallet saved");
    }

    let mismatches = ledger.verify_balance_cache()?;
    if !mismatches.is_empty() {
        bail!("balance cache disagrees with the UTXO set: {mismatches:?}");
    }

    let height = ledger.next_height();
    let stats = ledger.utxo_stats()?;
    let tip = ledger.chain_tip().context("chain has no tip after mining")?;
    let mut balances = serde_json::Map::new();
    for addr in [alice_addr, bob_addr, miner_addr] {
        balances.insert(addr.to_string(), ledger.balance(&addr)?.into());
    }
    let report = serde_json::json!({
        "tip": { "height": tip.index, "hash": hex::encode(tip.hash.as_bytes()) },
        "transfer": tx.hash().to_string(),
        "balances": balances,
        "wallets": {
            "alice": alice.balance(height, config.coinbase_maturity).total,
            "bob": bob.balance(height, config.coinbase_maturity).total,
        },
        "utxo_stats": stats,
        "mempool": ledger.mempool_len(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Assemble, search a nonce for, and commit the next block.
fn mine_next(ledger: &Ledger<MemoryChainStore>, miner: &Address, max_nonce: u64) -> Result<()> {
    let mut block = ledger.block_template(miner, unix_now())?;
    if !mine_block(&mut block, max_nonce) {
        bail!(
            "no nonce below {max_nonce} meets difficulty {}",
            block.header.difficulty
        );
    }
    let connected = ledger.submit_block(&block)?;
    info!(
        height = connected.block.height,
        nonce = block.header.nonce,
        txs = connected.block.tx_count,
        "mined block"
    );
    Ok(())
}

fn owned_by(ledger: &Ledger<MemoryChainStore>, wallet: &Wallet) -> Vec<Utxo> {
    wallet
        .addresses()
        .iter()
        .flat_map(|a| ledger.list_by_address(a))
        .collect()
}
