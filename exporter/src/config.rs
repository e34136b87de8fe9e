//! Top-level configuration for the exporter.
//!
//! This module aggregates configuration for:
//!
//! - the JSON-RPC block source (URL + timeout),
//! - storage (driver + DSN),
//! - the validator name file (path + reload interval),
//! - ingestion parameters (`IngestConfig`),
//! - the metrics exporter (enable flag, listen address, namespace).
//!
//! `main.rs` builds an `ExporterConfig` from command-line flags and
//! environment variables; everything else starts from `Default`.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub use crate::ingest::IngestConfig;
use crate::storage::RocksDbConfig;

/// Configuration for the execution node connection.
#[derive(Clone, Debug)]
pub struct RpcConfig {
    /// JSON-RPC endpoint, e.g. `"http://localhost:8545"`.
    pub url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8545".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Persistence backend selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StorageDriver {
    #[default]
    RocksDb,
    Memory,
}

impl StorageDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageDriver::RocksDb => "rocksdb",
            StorageDriver::Memory => "memory",
        }
    }
}

impl fmt::Display for StorageDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rocksdb" => Ok(StorageDriver::RocksDb),
            "memory" | "mem" => Ok(StorageDriver::Memory),
            other => Err(format!(
                "unsupported database driver `{other}` (expected `rocksdb` or `memory`)"
            )),
        }
    }
}

/// Configuration for the fact store.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub driver: StorageDriver,
    /// Driver-specific location. For RocksDB this is the database directory;
    /// the memory driver ignores it.
    pub dsn: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            driver: StorageDriver::default(),
            dsn: RocksDbConfig::default().path,
        }
    }
}

impl StorageConfig {
    /// RocksDB settings derived from the DSN.
    pub fn rocksdb(&self) -> RocksDbConfig {
        RocksDbConfig {
            path: self.dsn.clone(),
            ..RocksDbConfig::default()
        }
    }
}

/// Configuration for validator display names.
#[derive(Clone, Debug)]
pub struct ValidatorsConfig {
    /// YAML file mapping producer addresses to names.
    pub path: PathBuf,
    /// How often the file is re-read.
    pub reload_interval: Duration,
}

impl Default for ValidatorsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("validators.yaml"),
            reload_interval: Duration::from_secs(300),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
    /// Prefix for every metric name. Empty means no prefix.
    pub namespace: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        let addr: SocketAddr = "0.0.0.0:9090"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
            namespace: "eth".to_string(),
        }
    }
}

/// Top-level configuration for the exporter process.
#[derive(Clone, Debug, Default)]
pub struct ExporterConfig {
    pub rpc: RpcConfig,
    pub storage: StorageConfig,
    pub validators: ValidatorsConfig,
    pub ingest: IngestConfig,
    pub metrics: MetricsConfig,
}
