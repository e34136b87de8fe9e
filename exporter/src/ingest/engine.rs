//! Batch ingestion orchestration.
//!
//! One cycle of the [`Ingestor`] moves through:
//!
//! 1. reading the chain head and comparing it to the checkpoint,
//! 2. ingesting the blocks `[checkpoint, min(checkpoint + batch - 1, head)]`
//!    in ascending order,
//! 3. republishing the windowed aggregates when anything was stored,
//! 4. advancing the checkpoint past the last attempted block.
//!
//! A block that cannot be fetched is logged and skipped. A head read or a
//! store write that fails aborts the cycle and leaves the checkpoint where
//! it was, so the next tick retries the same range.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::detector::ClientDetector;
use crate::metrics::MetricsRegistry;
use crate::source::{BlockSource, RawBlock};
use crate::store::BlockFactStore;
use crate::types::{Address, AggregationWindow, BlockFact, current_unix_timestamp};
use crate::validators::ValidatorNames;

use super::config::IngestConfig;
use super::error::IngestError;

/// Summary of one ingested batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReport {
    /// First block of the planned range.
    pub first: u64,
    /// Last block of the planned range.
    pub last: u64,
    /// Blocks fetched and stored.
    pub succeeded: u64,
    /// Blocks skipped because the source could not deliver them.
    pub failed: u64,
    /// `true` if cancellation stopped the batch before `last`.
    pub cancelled: bool,
}

/// What a single call to [`Ingestor::run_cycle`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The checkpoint has caught up with the chain head.
    UpToDate { head: u64 },
    /// A batch of blocks was attempted.
    Batch(BatchReport),
}

/// Block ingestion pipeline.
///
/// This struct is generic over:
///
/// - `B`: chain access implementing [`BlockSource`],
/// - `S`: persistence implementing [`BlockFactStore`].
pub struct Ingestor<B, S> {
    pub config: IngestConfig,
    source: B,
    store: S,
    detector: ClientDetector,
    validators: ValidatorNames,
    metrics: Arc<MetricsRegistry>,
    /// Next block to ingest.
    next_block: u64,
}

impl<B, S> Ingestor<B, S>
where
    B: BlockSource,
    S: BlockFactStore,
{
    /// Creates a new ingestor. The checkpoint starts at
    /// `config.start_block`; call [`Ingestor::resolve_start_block`] to
    /// recover it from the store instead.
    pub fn new(
        config: IngestConfig,
        source: B,
        store: S,
        validators: ValidatorNames,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            next_block: config.start_block,
            config,
            source,
            store,
            detector: ClientDetector::default(),
            validators,
            metrics,
        }
    }

    /// Replaces the default detector.
    pub fn with_detector(mut self, detector: ClientDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Returns a reference to the underlying fact store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Next block the ingestor will attempt.
    pub fn checkpoint(&self) -> u64 {
        self.next_block
    }

    /// Overrides the checkpoint.
    pub fn set_checkpoint(&mut self, next_block: u64) {
        self.next_block = next_block;
    }

    /// Decides where ingestion starts and stores it as the checkpoint.
    ///
    /// A nonzero configured start block wins. Otherwise the highest stored
    /// block is used (re-ingesting it once is harmless). A store that
    /// cannot be read counts as empty. The result is clamped to the current
    /// head; failing to read the head is an error.
    pub async fn resolve_start_block(&mut self) -> Result<u64, IngestError> {
        let head = self.source.chain_head().await?;

        let mut start = if self.config.start_block != 0 {
            tracing::info!(block = self.config.start_block, "using configured start block");
            self.config.start_block
        } else {
            match self.store.last_processed_block() {
                Ok(0) => 0,
                Ok(last) => {
                    tracing::info!(block = last, "resuming from last processed block");
                    last
                }
                Err(e) => {
                    tracing::warn!(error = %e, "could not read last processed block, starting from 0");
                    0
                }
            }
        };

        if start > head {
            tracing::warn!(start, head, "start block is ahead of chain head, clamping");
            start = head;
        }

        self.next_block = start;
        Ok(start)
    }

    /// Runs a single ingestion cycle.
    ///
    /// `cancel` is checked before every block; the block in flight always
    /// finishes and the checkpoint moves past it.
    pub async fn run_cycle(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, IngestError> {
        let head = self.source.chain_head().await?;

        if self.next_block > head {
            // Ingesting the head block leaves the checkpoint one past it.
            if self.next_block - head > 1 {
                tracing::warn!(
                    checkpoint = self.next_block,
                    head,
                    "checkpoint is ahead of chain head, clamping"
                );
            } else {
                tracing::debug!(head, "caught up with chain head");
            }
            self.next_block = head;
        }

        let first = self.next_block;
        if first >= head {
            tracing::debug!(head, "up to date");
            return Ok(CycleOutcome::UpToDate { head });
        }

        let last = first
            .saturating_add(self.config.effective_batch_size() - 1)
            .min(head);
        tracing::debug!(first, last, head, "ingesting batch");

        let mut report = BatchReport {
            first,
            last,
            succeeded: 0,
            failed: 0,
            cancelled: false,
        };
        let mut next = first;

        for number in first..=last {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let started = Instant::now();
            match self.source.block_by_number(number).await {
                Ok(raw) => {
                    let fact = self.build_fact(raw);
                    let recorded = fact.clone();
                    self.store.upsert(fact)?;
                    self.metrics
                        .exporter
                        .record_block(&recorded, started.elapsed());
                    tracing::debug!(
                        block = number,
                        client = %recorded.client,
                        version = %recorded.version,
                        validator = %recorded.validator,
                        txs = recorded.tx_count,
                        "ingested block"
                    );
                    report.succeeded += 1;
                }
                Err(e) => {
                    tracing::warn!(block = number, error = %e, "failed to fetch block, skipping");
                    report.failed += 1;
                }
            }
            next = number.saturating_add(1);
        }

        if report.succeeded > 0 {
            self.publish_aggregates();
        }

        self.next_block = next;
        tracing::info!(
            first,
            last = next.saturating_sub(1),
            succeeded = report.succeeded,
            failed = report.failed,
            "processed batch"
        );
        Ok(CycleOutcome::Batch(report))
    }

    /// Runs cycles every `poll_interval` until `cancel` fires. The first
    /// cycle starts immediately.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.run_cycle(&cancel).await {
                tracing::warn!(
                    checkpoint = self.next_block,
                    error = %e,
                    "ingestion cycle failed, retrying next tick"
                );
            }
        }

        tracing::info!(checkpoint = self.next_block, "ingestion stopped");
    }

    fn build_fact(&self, raw: RawBlock) -> BlockFact {
        let producer = Address::normalize(&raw.producer);
        let detection = self.detector.detect(&raw.extra_data_hex, None);
        let validator = self.validators.label_for(&producer);

        BlockFact {
            number: raw.number,
            producer,
            validator,
            client: detection.client.as_str().to_string(),
            version: detection.version,
            extra_data_hex: raw.extra_data_hex,
            tx_count: raw.tx_count,
            observed_at: current_unix_timestamp(),
        }
    }

    fn publish_aggregates(&self) {
        let window = AggregationWindow::trailing(self.config.aggregation_window);
        match self.store.aggregates(window) {
            Ok(aggs) => self.metrics.exporter.publish_aggregates(&aggs),
            Err(e) => tracing::warn!(error = %e, "aggregation failed, keeping previous gauges"),
        }
    }
}

const MIN_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(10);
