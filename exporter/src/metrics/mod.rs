//! Metrics and instrumentation for the exporter.
//!
//! This module defines the Prometheus metrics describing block production
//! and exposes a small HTTP exporter that serves `/metrics` in Prometheus
//! text format.
//!
//! Typical usage:
//!
//! ```ignore
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use exporter::metrics::{MetricsRegistry, run_prometheus_http_server};
//!
//! let registry = Arc::new(MetricsRegistry::new("eth")?);
//! let addr: SocketAddr = "0.0.0.0:9090".parse()?;
//!
//! tokio::spawn(run_prometheus_http_server(registry.clone(), addr, cancel.clone()));
//!
//! // Per ingested block:
//! registry.exporter.record_block(&fact, elapsed);
//! ```

pub mod prometheus;

pub use prometheus::{ExporterMetrics, MetricsRegistry, run_prometheus_http_server, serve_metrics};
