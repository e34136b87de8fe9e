//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and the strongly-typed exporter metrics, and an async HTTP
//! exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use prometheus::{
    self, Encoder, GaugeVec, IntCounter, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::types::{Aggregates, BlockFact};

/// Block attribution metrics.
///
/// Two groups live here:
///
/// - per-block counters and gauges, updated by [`ExporterMetrics::record_block`],
/// - windowed gauge vectors, replaced wholesale by
///   [`ExporterMetrics::publish_aggregates`].
#[derive(Clone)]
pub struct ExporterMetrics {
    pub blocks_processed: IntCounter,
    pub empty_blocks: IntCounter,
    pub transactions: IntCounter,
    pub last_block_number: IntGauge,
    pub client_blocks: IntGaugeVec,
    pub miner_blocks: IntGaugeVec,
    pub empty_blocks_by_client: IntGaugeVec,
    pub empty_blocks_by_miner: IntGaugeVec,
    pub empty_blocks_by_validator: IntGaugeVec,
    /// Wall time spent ingesting the latest block of each client, in seconds.
    pub block_time_seconds: GaugeVec,
}

impl ExporterMetrics {
    /// Registers exporter metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let blocks_processed = IntCounter::with_opts(Opts::new(
            "blocks_processed_total",
            "Total number of blocks processed",
        ))?;
        registry.register(Box::new(blocks_processed.clone()))?;

        let empty_blocks = IntCounter::with_opts(Opts::new(
            "empty_blocks_total",
            "Total number of empty blocks processed",
        ))?;
        registry.register(Box::new(empty_blocks.clone()))?;

        let transactions = IntCounter::with_opts(Opts::new(
            "transactions_total",
            "Total number of transactions processed",
        ))?;
        registry.register(Box::new(transactions.clone()))?;

        let last_block_number = IntGauge::with_opts(Opts::new(
            "last_block_number",
            "Number of the last block processed",
        ))?;
        registry.register(Box::new(last_block_number.clone()))?;

        let client_blocks = IntGaugeVec::new(
            Opts::new(
                "client_blocks",
                "Number of blocks by client, version, and validator",
            ),
            &["client", "version", "validator"],
        )?;
        registry.register(Box::new(client_blocks.clone()))?;

        let miner_blocks = IntGaugeVec::new(
            Opts::new(
                "miner_blocks",
                "Number of blocks by miner, client, and validator",
            ),
            &["miner", "client", "validator"],
        )?;
        registry.register(Box::new(miner_blocks.clone()))?;

        let empty_blocks_by_client = IntGaugeVec::new(
            Opts::new("empty_blocks_by_client", "Number of empty blocks by client"),
            &["client", "version"],
        )?;
        registry.register(Box::new(empty_blocks_by_client.clone()))?;

        let empty_blocks_by_miner = IntGaugeVec::new(
            Opts::new("empty_blocks_by_miner", "Number of empty blocks by miner"),
            &["miner"],
        )?;
        registry.register(Box::new(empty_blocks_by_miner.clone()))?;

        let empty_blocks_by_validator = IntGaugeVec::new(
            Opts::new(
                "empty_blocks_by_validator",
                "Number of empty blocks by validator",
            ),
            &["validator"],
        )?;
        registry.register(Box::new(empty_blocks_by_validator.clone()))?;

        let block_time_seconds = GaugeVec::new(
            Opts::new("block_time_seconds", "Time taken to process each block"),
            &["client"],
        )?;
        registry.register(Box::new(block_time_seconds.clone()))?;

        Ok(Self {
            blocks_processed,
            empty_blocks,
            transactions,
            last_block_number,
            client_blocks,
            miner_blocks,
            empty_blocks_by_client,
            empty_blocks_by_miner,
            empty_blocks_by_validator,
            block_time_seconds,
        })
    }

    /// Updates the per-block counters and gauges for one ingested block.
    pub fn record_block(&self, fact: &BlockFact, processing: Duration) {
        self.blocks_processed.inc();
        self.last_block_number
            .set(i64::try_from(fact.number).unwrap_or(i64::MAX));

        if fact.is_empty() {
            self.empty_blocks.inc();
            self.empty_blocks_by_client
                .with_label_values(&[fact.client.as_str(), fact.version.as_str()])
                .inc();
            self.empty_blocks_by_miner
                .with_label_values(&[fact.producer.as_str()])
                .inc();
        } else {
            self.transactions.inc_by(fact.tx_count);
        }

        self.block_time_seconds
            .with_label_values(&[fact.client.as_str()])
            .set(processing.as_secs_f64());
    }

    /// Replaces the windowed gauge vectors with `aggs`.
    ///
    /// Every label combination published before is cleared first, so a
    /// validator that dropped out of the window disappears from `/metrics`
    /// instead of reporting its last count forever.
    pub fn publish_aggregates(&self, aggs: &Aggregates) {
        self.client_blocks.reset();
        self.miner_blocks.reset();
        self.empty_blocks_by_validator.reset();

        for (key, count) in &aggs.by_client {
            self.client_blocks
                .with_label_values(&[
                    key.client.as_str(),
                    key.version.as_str(),
                    key.validator.as_str(),
                ])
                .set(saturating_i64(*count));
        }

        for (key, count) in &aggs.by_miner {
            self.miner_blocks
                .with_label_values(&[
                    key.miner.as_str(),
                    key.client.as_str(),
                    key.validator.as_str(),
                ])
                .set(saturating_i64(*count));
        }

        for (validator, count) in &aggs.empty_by_validator {
            self.empty_blocks_by_validator
                .with_label_values(&[validator.as_str()])
                .set(saturating_i64(*count));
        }
    }
}

fn saturating_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

/// Wrapper around a Prometheus registry and the exporter metrics.
///
/// This is the main handle you pass around in the process. It can be
/// wrapped in an [`Arc`] and shared across threads/tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub exporter: ExporterMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the exporter metrics. Metric names are prefixed with
    /// `namespace_` unless `namespace` is empty.
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let prefix = (!namespace.is_empty()).then(|| namespace.to_string());
        let registry = Registry::new_custom(prefix, None)?;
        let exporter = ExporterMetrics::register(&registry)?;
        Ok(Self { registry, exporter })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format and `GET /health` with `ok`. All
/// other paths return 404. The accept loop ends when `cancel` fires.
///
/// ```ignore
/// let registry = Arc::new(MetricsRegistry::new("eth")?);
/// let addr: SocketAddr = "127.0.0.1:9090".parse()?;
/// tokio::spawn(run_prometheus_http_server(registry.clone(), addr, cancel.clone()));
/// ```
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    serve_metrics(listener, metrics, cancel).await
}

/// Serves metrics on an already-bound listener.
pub async fn serve_metrics(
    listener: TcpListener,
    metrics: Arc<MetricsRegistry>,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        let (stream, _) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted?,
        };
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::debug!("prometheus HTTP connection error: {err}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(route(req.method(), req.uri().path(), &metrics))
}

fn route(method: &Method, path: &str, metrics: &MetricsRegistry) -> Response<Full<Bytes>> {
    let (status, content_type, body) = match (method, path) {
        (&Method::GET, "/metrics") => (
            StatusCode::OK,
            "text/plain; version=0.0.4",
            metrics.gather_text(),
        ),
        (&Method::GET, "/health") => (StatusCode::OK, "text/plain", "ok".to_string()),
        _ => (StatusCode::NOT_FOUND, "text/plain", "not found".to_string()),
    };

    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static(content_type),
    );
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, ClientVersionValidator, MinerClientValidator};
    use http_body_util::BodyExt;

    fn fact(number: u64, client: &str, tx_count: u64) -> BlockFact {
        BlockFact {
            number,
            producer: Address::normalize("0xFeeD"),
            validator: "Validator A".to_string(),
            client: client.to_string(),
            version: "1.0.0".to_string(),
            extra_data_hex: String::new(),
            tx_count,
            observed_at: 0,
        }
    }

    fn aggregates(validators: &[&str]) -> Aggregates {
        let mut aggs = Aggregates::default();
        for v in validators {
            aggs.by_client.insert(
                ClientVersionValidator {
                    client: "Geth".to_string(),
                    version: "1.14.0".to_string(),
                    validator: v.to_string(),
                },
                3,
            );
            aggs.by_miner.insert(
                MinerClientValidator {
                    miner: "0x01".to_string(),
                    client: "Geth".to_string(),
                    validator: v.to_string(),
                },
                3,
            );
            aggs.empty_by_validator.insert(v.to_string(), 1);
        }
        aggs
    }

    #[test]
    fn record_block_updates_counters() {
        let registry = Registry::new();
        let metrics = ExporterMetrics::register(&registry).expect("register metrics");

        metrics.record_block(&fact(100, "Geth", 4), Duration::from_millis(20));
        metrics.record_block(&fact(101, "RETH", 0), Duration::from_millis(10));

        assert_eq!(metrics.blocks_processed.get(), 2);
        assert_eq!(metrics.transactions.get(), 4);
        assert_eq!(metrics.empty_blocks.get(), 1);
        assert_eq!(metrics.last_block_number.get(), 101);
        assert_eq!(
            metrics
                .empty_blocks_by_client
                .with_label_values(&["RETH", "1.0.0"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .empty_blocks_by_miner
                .with_label_values(&["0xfeed"])
                .get(),
            1
        );
        let latency = metrics.block_time_seconds.with_label_values(&["Geth"]).get();
        assert!((latency - 0.02).abs() < 1e-9);
    }

    #[test]
    fn publish_aggregates_drops_vanished_series() {
        let registry = MetricsRegistry::new("eth").expect("create metrics registry");
        let metrics = &registry.exporter;

        metrics.publish_aggregates(&aggregates(&["Alpha", "Beta"]));
        let text = registry.gather_text();
        assert!(text.contains("validator=\"Alpha\""));
        assert!(text.contains("validator=\"Beta\""));

        metrics.publish_aggregates(&aggregates(&["Beta"]));
        let text = registry.gather_text();
        assert!(!text.contains("validator=\"Alpha\""));
        assert!(text.contains("eth_client_blocks{"));
        assert!(text.contains("eth_empty_blocks_by_validator{validator=\"Beta\"} 1"));
    }

    #[test]
    fn publish_aggregates_leaves_per_block_metrics_alone() {
        let registry = MetricsRegistry::new("eth").expect("create metrics registry");
        let metrics = &registry.exporter;

        metrics.record_block(&fact(5, "Geth", 0), Duration::from_millis(1));
        metrics.publish_aggregates(&Aggregates::default());

        assert_eq!(metrics.blocks_processed.get(), 1);
        assert_eq!(
            metrics
                .empty_blocks_by_client
                .with_label_values(&["Geth", "1.0.0"])
                .get(),
            1
        );
    }

    #[test]
    fn metrics_registry_gather_text_uses_namespace() {
        let registry = MetricsRegistry::new("eth").expect("create metrics registry");
        registry.exporter.blocks_processed.inc();
        let text = registry.gather_text();
        assert!(text.contains("eth_blocks_processed_total 1"));

        let bare = MetricsRegistry::new("").expect("create metrics registry");
        bare.exporter.last_block_number.set(9);
        assert!(bare.gather_text().contains("\nlast_block_number 9"));
    }

    #[tokio::test]
    async fn routes_serve_metrics_health_and_404() {
        let registry = MetricsRegistry::new("eth").expect("create metrics registry");
        registry.exporter.last_block_number.set(42);

        let resp = route(&Method::GET, "/metrics", &registry);
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("eth_last_block_number 42"));

        let resp = route(&Method::GET, "/health", &registry);
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = route(&Method::POST, "/metrics", &registry);
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
