//! Resumable block ingestion.
//!
//! This module drives the exporter:
//!
//! - configuration parameters ([`config::IngestConfig`]),
//! - cycle-level errors ([`error::IngestError`]),
//! - the [`engine::Ingestor`] that pulls bounded batches of blocks from a
//!   [`crate::source::BlockSource`], attributes them, persists them through a
//!   [`crate::store::BlockFactStore`] and republishes the windowed metrics.

pub mod config;
pub mod engine;
pub mod error;

pub use config::IngestConfig;
pub use engine::{BatchReport, CycleOutcome, Ingestor};
pub use error::IngestError;
