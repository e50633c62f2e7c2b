//! Ledger configuration.
//!
//! [`LedgerConfig`] is assembled from three layers, later ones winning:
//! built-in defaults, an optional TOML file, then `SANCOIN_*` environment
//! variables (`SANCOIN_MIN_FEE=2000`, `SANCOIN_NETWORK=mainnet`).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use san_core::address::Network;
use san_core::mempool::DEFAULT_MAX_COUNT;
use san_core::policy::{StandardPolicy, DEFAULT_MAX_BLOCK_TXS};

use crate::balance_cache::DEFAULT_CAPACITY as DEFAULT_BALANCE_CACHE_CAPACITY;
use crate::error::LedgerServiceError;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "SANCOIN";

/// Default mempool entry lifetime: two weeks.
pub const DEFAULT_MEMPOOL_MAX_AGE: u64 = 14 * 24 * 60 * 60;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Configuration for a [`Ledger`](crate::Ledger) and the process hosting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Network addresses are generated for.
    pub network: Network,
    /// Block subsidy in sats, before fees.
    pub block_reward: u64,
    /// Minimum implicit fee for a transfer, in sats.
    pub min_fee: u64,
    /// Blocks before a coinbase output can be spent.
    pub coinbase_maturity: u64,
    /// Required leading zero bits of a block header hash.
    pub difficulty_bits: u32,
    pub mempool_max_count: usize,
    /// Age in seconds at which an unconfirmed transaction expires.
    pub mempool_max_age: u64,
    /// Maximum non-coinbase transactions per assembled block.
    pub max_block_txs: usize,
    /// Most addresses the balance cache holds before it is emptied.
    pub balance_cache_capacity: usize,
    /// Log filter directive (e.g. "info", "san_ledger=debug").
    pub log_level: String,
    pub log_format: LogFormat,
    /// Root directory for wallet files and other local data.
    pub data_dir: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let policy = StandardPolicy::default();
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sancoin");

        Self {
            network: Network::Mainnet,
            block_reward: policy.block_reward,
            min_fee: policy.min_fee,
            coinbase_maturity: policy.coinbase_maturity,
            difficulty_bits: policy.difficulty_bits,
            mempool_max_count: DEFAULT_MAX_COUNT,
            mempool_max_age: DEFAULT_MEMPOOL_MAX_AGE,
            max_block_txs: DEFAULT_MAX_BLOCK_TXS,
            balance_cache_capacity: DEFAULT_BALANCE_CACHE_CAPACITY,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            data_dir,
        }
    }
}

impl LedgerConfig {
    /// Local development settings: testnet addresses, trivial work, and
    /// coinbase outputs spendable one block later.
    pub fn regtest() -> Self {
        let policy = StandardPolicy::regtest();
        Self {
            network: Network::Testnet,
            coinbase_maturity: policy.coinbase_maturity,
            difficulty_bits: policy.difficulty_bits,
            ..Self::default()
        }
    }

    /// Load defaults, then `path` if given, then `SANCOIN_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, LedgerServiceError> {
        Self::load_layers(Self::default(), path, environment())
    }

    /// Like [`load`](Self::load) but layered over `base` instead of the
    /// built-in defaults, with an explicit environment source.
    pub fn load_layers(
        base: Self,
        path: Option<&Path>,
        env: Environment,
    ) -> Result<Self, LedgerServiceError> {
        let mut builder = Config::builder().add_source(Config::try_from(&base)?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        let config: Self = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no ledger can run with.
    pub fn validate(&self) -> Result<(), LedgerServiceError> {
        if self.mempool_max_count == 0 {
            return Err(LedgerServiceError::InvalidConfig(
                "mempool_max_count must be at least 1".into(),
            ));
        }
        if self.max_block_txs == 0 {
            return Err(LedgerServiceError::InvalidConfig(
                "max_block_txs must be at least 1".into(),
            ));
        }
        if self.balance_cache_capacity == 0 {
            return Err(LedgerServiceError::InvalidConfig(
                "balance_cache_capacity must be at least 1".into(),
            ));
        }
        if self.difficulty_bits > 256 {
            return Err(LedgerServiceError::InvalidConfig(format!(
                "difficulty_bits {} exceeds hash width",
                self.difficulty_bits
            )));
        }
        if self.log_level.trim().is_empty() {
            return Err(LedgerServiceError::InvalidConfig("log_level is empty".into()));
        }
        Ok(())
    }

    /// Consensus parameters derived from this config.
    pub fn policy(&self) -> StandardPolicy {
        StandardPolicy {
            block_reward: self.block_reward,
            min_fee: self.min_fee,
            coinbase_maturity: self.coinbase_maturity,
            difficulty_bits: self.difficulty_bits,
        }
    }

    /// Default location of the encrypted wallet file.
    pub fn wallet_path(&self) -> PathBuf {
        self.data_dir.join("wallet.dat")
    }
}

/// The `SANCOIN_*` environment layer. Nested keys use `__`.
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
