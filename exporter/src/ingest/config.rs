use std::time::Duration;

use crate::types::DEFAULT_AGGREGATION_WINDOW;

/// Ingestion loop parameters.
///
/// This includes where to start on a fresh store, how many blocks to pull
/// per cycle, how often to poll the node, and how far back the windowed
/// aggregates reach.
#[derive(Clone, Debug)]
pub struct IngestConfig {
    /// Explicit start block. `0` means "resume from the store".
    pub start_block: u64,
    /// Maximum number of blocks ingested per cycle. Values below 1 act as 1.
    pub batch_size: u64,
    /// Delay between cycles.
    pub poll_interval: Duration,
    /// Trailing window for the published aggregates.
    pub aggregation_window: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            batch_size: 10,
            poll_interval: Duration::from_secs(2),
            aggregation_window: DEFAULT_AGGREGATION_WINDOW,
        }
    }
}

impl IngestConfig {
    pub(crate) fn effective_batch_size(&self) -> u64 {
        self.batch_size.max(1)
    }
}
