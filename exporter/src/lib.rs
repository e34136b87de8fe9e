//! Execution-client attribution exporter.
//!
//! This crate pulls blocks from an Ethereum execution node, works out which
//! client software and which validator produced each one, keeps a durable
//! per-block record, and republishes rolling statistics as Prometheus
//! metrics:
//!
//! - strongly-typed domain types (`types`),
//! - client detection from block `extraData` (`detector`),
//! - the fact store abstraction (`store`) and its backends (`storage`),
//! - chain access over JSON-RPC (`source`),
//! - validator display names with hot reload (`validators`),
//! - the resumable ingestion loop (`ingest`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level process configuration (`config`).

pub mod config;
pub mod detector;
pub mod ingest;
pub mod metrics;
pub mod source;
pub mod storage;
pub mod store;
pub mod types;
pub mod validators;

// Re-export top-level configuration types.
pub use config::{
    ExporterConfig, MetricsConfig, RpcConfig, StorageConfig, StorageDriver, ValidatorsConfig,
};

pub use detector::{ClientDetector, Detection, ExecutionClient};
pub use ingest::{BatchReport, CycleOutcome, IngestConfig, IngestError, Ingestor};
pub use metrics::{ExporterMetrics, MetricsRegistry, run_prometheus_http_server};
pub use source::{BlockSource, HttpBlockSource, RawBlock, SourceError};
pub use storage::{InMemoryFactStore, RocksDbConfig, RocksDbFactStore};
pub use store::{BlockFactStore, StoreError};
pub use validators::{
    ValidatorDirectory, ValidatorError, ValidatorNameSource, ValidatorNames, YamlValidatorFile,
    run_reload_loop,
};

// Re-export domain types at the crate root for convenience.
pub use types::*;
