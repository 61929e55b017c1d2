// Path: crates/types/src/config.rs
//! Node configuration structures, deserialized from the TOML file passed
//! via `--config`.

use crate::fixed::FixedPoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeConfig {
    /// Chain identity and data locations.
    pub base: BaseConfig,
    /// Producer/validator settings.
    pub pob: PobConfig,
    /// Transaction pool settings.
    #[serde(default)]
    pub txpool: TxPoolConfig,
    /// RPC gateway settings.
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Synchronizer settings.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// Chain identity and data locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
    /// The chain network identifier.
    pub chain_id: String,
    /// Root directory for the durable block chain store.
    pub data_dir: PathBuf,
    /// Genesis parameters, applied only when the chain store is empty.
    #[serde(default)]
    pub genesis: GenesisConfig,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            chain_id: "kaon-local".to_string(),
            data_dir: PathBuf::from("./kaon-data"),
            genesis: GenesisConfig::default(),
        }
    }
}

/// Genesis parameters: initial balances for the native token.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenesisConfig {
    /// Initial `kaon` token balances per account.
    #[serde(default)]
    pub balances: BTreeMap<String, FixedPoint>,
    /// Initial `ram` token balances per account.
    #[serde(default)]
    pub ram: BTreeMap<String, i64>,
}

/// Producer/validator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PobConfig {
    /// The pre-declared, ordered witness list (base58 public keys).
    pub witness_list: Vec<String>,
    /// Slot length in seconds.
    pub slot_length_secs: i64,
    /// Base58 seed of this node's producing key; absent on observer nodes.
    #[serde(default)]
    pub produce_seed: Option<String>,
}

impl Default for PobConfig {
    fn default() -> Self {
        Self {
            witness_list: Vec::new(),
            slot_length_secs: 3,
            produce_seed: None,
        }
    }
}

/// Transaction pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxPoolConfig {
    /// Maximum number of pending transactions.
    pub cache_size: usize,
    /// How many ancestor blocks the duplicate check walks.
    pub lookback: usize,
    /// Minimum accepted gas ratio.
    pub min_gas_ratio: i64,
    /// Admission window around `now` for creation times, in seconds.
    pub admit_window_secs: i64,
}

impl Default for TxPoolConfig {
    fn default() -> Self {
        Self {
            cache_size: 65_536,
            lookback: 900,
            min_gas_ratio: 100,
            admit_window_secs: 90,
        }
    }
}

/// RPC gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Listen address, e.g. `127.0.0.1:30001`.
    pub listen_addr: String,
    /// Maximum concurrent event streams.
    pub max_streams: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:30001".to_string(),
            max_streams: 64,
        }
    }
}

/// Synchronizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum outstanding range requests per peer.
    pub max_inflight_per_peer: usize,
    /// Number of blocks requested per range.
    pub range_width: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_inflight_per_peer: 4,
            range_width: 64,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// A tracing `EnvFilter` directive, e.g. `info,pob=debug`.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
