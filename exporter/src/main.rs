// src/main.rs
//
// Exporter binary that wires up the library:
//
// - RocksDB (or in-memory) fact store
// - JSON-RPC block source
// - validator names from a YAML file, reloaded in the background
// - Prometheus metrics exporter on /metrics
// - ingestion loop pulling block batches at a fixed interval.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use exporter::metrics::serve_metrics;
use exporter::{
    BlockFactStore, BlockSource, ExporterConfig, HttpBlockSource, InMemoryFactStore, Ingestor,
    MetricsRegistry, RocksDbFactStore, StorageDriver, ValidatorDirectory, ValidatorNameSource,
    YamlValidatorFile, run_reload_loop,
};

/// Attributes Ethereum blocks to execution clients and validators and
/// exports the results as Prometheus metrics.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Execution node JSON-RPC endpoint.
    #[arg(long, env = "EXPORTER_RPC_URL", default_value = "http://localhost:8545")]
    rpc: String,

    /// Timeout for each JSON-RPC request, in seconds.
    #[arg(long, env = "EXPORTER_RPC_TIMEOUT_SECS", default_value_t = 10)]
    rpc_timeout_secs: u64,

    /// Fact store driver (`rocksdb` or `memory`).
    #[arg(long, env = "EXPORTER_DB_DRIVER", default_value = "rocksdb")]
    db_driver: StorageDriver,

    /// Fact store location; the RocksDB database directory.
    #[arg(long, env = "EXPORTER_DB_DSN", default_value = "data/eth-clients-db")]
    db_dsn: String,

    /// YAML file mapping producer addresses to validator names.
    #[arg(long, env = "EXPORTER_VALIDATORS", default_value = "validators.yaml")]
    validators: PathBuf,

    /// How often the validator file is re-read, in seconds.
    #[arg(long, env = "EXPORTER_VALIDATORS_RELOAD_SECS", default_value_t = 300)]
    validators_reload_secs: u64,

    /// First block to ingest. 0 resumes from the store.
    #[arg(long, env = "EXPORTER_START_BLOCK", default_value_t = 0)]
    start_block: u64,

    /// Maximum number of blocks ingested per cycle.
    #[arg(long, env = "EXPORTER_BATCH_SIZE", default_value_t = 10)]
    batch_size: u64,

    /// Delay between ingestion cycles, in milliseconds.
    #[arg(long, env = "EXPORTER_POLL_INTERVAL_MS", default_value_t = 2000)]
    poll_interval_ms: u64,

    /// Trailing window of the published aggregates, in seconds.
    #[arg(long, env = "EXPORTER_WINDOW_SECS", default_value_t = 86_400)]
    window_secs: u64,

    /// Serve `/metrics` and `/health` (`--metrics-enabled false` disables).
    #[arg(
        long,
        env = "EXPORTER_METRICS_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    metrics_enabled: bool,

    /// Address of the metrics HTTP server.
    #[arg(long, env = "EXPORTER_LISTEN", default_value = "0.0.0.0:9090")]
    listen: std::net::SocketAddr,

    /// Prefix for every metric name. Empty disables the prefix.
    #[arg(long, env = "EXPORTER_METRICS_NAMESPACE", default_value = "eth")]
    metrics_namespace: String,
}

impl Cli {
    fn into_config(self) -> ExporterConfig {
        let mut cfg = ExporterConfig::default();

        cfg.rpc.url = self.rpc;
        cfg.rpc.timeout = Duration::from_secs(self.rpc_timeout_secs);

        cfg.storage.driver = self.db_driver;
        cfg.storage.dsn = self.db_dsn;

        cfg.validators.path = self.validators;
        cfg.validators.reload_interval = Duration::from_secs(self.validators_reload_secs);

        cfg.ingest.start_block = self.start_block;
        cfg.ingest.batch_size = self.batch_size;
        cfg.ingest.poll_interval = Duration::from_millis(self.poll_interval_ms);
        cfg.ingest.aggregation_window = Duration::from_secs(self.window_secs);

        cfg.metrics.enabled = self.metrics_enabled;
        cfg.metrics.listen_addr = self.listen;
        cfg.metrics.namespace = self.metrics_namespace;
        cfg
    }
}

#[tokio::main]
async fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("exporter=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run().await {
        eprintln!("fatal error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cfg = Cli::parse().into_config();

    let metrics = Arc::new(
        MetricsRegistry::new(&cfg.metrics.namespace)
            .context("failed to initialise metrics registry")?,
    );

    match cfg.storage.driver {
        StorageDriver::RocksDb => {
            let store = RocksDbFactStore::open(&cfg.storage.rocksdb())
                .with_context(|| format!("failed to open RocksDB store at {}", cfg.storage.dsn))?;
            tracing::info!(path = %cfg.storage.dsn, "opened RocksDB fact store");
            run_with_store(cfg, metrics, store).await
        }
        StorageDriver::Memory => {
            tracing::info!("using in-memory fact store, nothing will persist across restarts");
            run_with_store(cfg, metrics, InMemoryFactStore::new()).await
        }
    }
}

async fn run_with_store<S>(
    cfg: ExporterConfig,
    metrics: Arc<MetricsRegistry>,
    store: S,
) -> anyhow::Result<()>
where
    S: BlockFactStore + 'static,
{
    // ---------------------------
    // Block source
    // ---------------------------

    let source = HttpBlockSource::new(cfg.rpc.url.clone(), cfg.rpc.timeout)
        .context("failed to create RPC client")?;
    let head = source
        .chain_head()
        .await
        .with_context(|| format!("failed to get latest block from {}", source.endpoint()))?;
    tracing::info!(rpc = %source.endpoint(), head, "connected to RPC");

    // ---------------------------
    // Validator names
    // ---------------------------

    let validator_file = YamlValidatorFile::new(cfg.validators.path.clone());
    let directory = ValidatorDirectory::default();
    match directory.reload(&validator_file) {
        Ok(count) => tracing::info!(
            validators = count,
            path = %validator_file.describe(),
            "loaded validator names"
        ),
        Err(e) => tracing::warn!("starting without validator names: {e}"),
    }

    // ---------------------------
    // Ingestion
    // ---------------------------

    let mut ingestor = Ingestor::new(
        cfg.ingest.clone(),
        source,
        store,
        directory.reader(),
        metrics.clone(),
    );
    let start = ingestor
        .resolve_start_block()
        .await
        .context("failed to resolve start block")?;
    tracing::info!(
        start,
        batch_size = cfg.ingest.batch_size,
        "starting block processor"
    );

    let cancel = CancellationToken::new();

    // ---------------------------
    // Metrics exporter
    // ---------------------------

    let metrics_task = if cfg.metrics.enabled {
        let addr = cfg.metrics.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
        tracing::info!("metrics exporter listening on http://{addr}/metrics");

        let metrics = metrics.clone();
        let cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = serve_metrics(listener, metrics, cancel).await {
                tracing::error!("metrics HTTP server error: {e}");
            }
        }))
    } else {
        None
    };

    let reload_task = tokio::spawn(run_reload_loop(
        directory,
        validator_file,
        cfg.validators.reload_interval,
        cancel.clone(),
    ));
    let ingest_task = tokio::spawn(ingestor.run(cancel.clone()));

    shutdown_signal().await;
    cancel.cancel();

    if let Err(e) = ingest_task.await {
        tracing::warn!("ingestion task ended abnormally: {e}");
    }
    if let Err(e) = reload_task.await {
        tracing::warn!("validator reload task ended abnormally: {e}");
    }
    if let Some(task) = metrics_task {
        if let Err(e) = task.await {
            tracing::warn!("metrics task ended abnormally: {e}");
        }
    }

    tracing::info!("exporter stopped");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_config_defaults() {
        let cfg = Cli::parse_from(["eth-client-exporter"]).into_config();
        let defaults = ExporterConfig::default();

        assert_eq!(cfg.rpc.url, defaults.rpc.url);
        assert_eq!(cfg.rpc.timeout, defaults.rpc.timeout);
        assert_eq!(cfg.storage.driver, defaults.storage.driver);
        assert_eq!(cfg.storage.dsn, defaults.storage.dsn);
        assert_eq!(cfg.validators.path, defaults.validators.path);
        assert_eq!(cfg.validators.reload_interval, defaults.validators.reload_interval);
        assert_eq!(cfg.ingest.batch_size, defaults.ingest.batch_size);
        assert_eq!(cfg.ingest.poll_interval, defaults.ingest.poll_interval);
        assert_eq!(cfg.ingest.aggregation_window, defaults.ingest.aggregation_window);
        assert_eq!(cfg.metrics.enabled, defaults.metrics.enabled);
        assert_eq!(cfg.metrics.listen_addr, defaults.metrics.listen_addr);
        assert_eq!(cfg.metrics.namespace, defaults.metrics.namespace);
    }

    #[test]
    fn cli_flags_override_defaults() {
        let cfg = Cli::parse_from([
            "eth-client-exporter",
            "--rpc",
            "http://node:8545",
            "--db-driver",
            "memory",
            "--start-block",
            "19000000",
            "--batch-size",
            "25",
            "--metrics-namespace",
            "",
            "--metrics-enabled",
            "false",
        ])
        .into_config();

        assert_eq!(cfg.rpc.url, "http://node:8545");
        assert_eq!(cfg.storage.driver, StorageDriver::Memory);
        assert_eq!(cfg.ingest.start_block, 19_000_000);
        assert_eq!(cfg.ingest.batch_size, 25);
        assert!(cfg.metrics.namespace.is_empty());
        assert!(!cfg.metrics.enabled);
    }
}
