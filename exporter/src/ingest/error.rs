use crate::source::SourceError;
use crate::store::StoreError;

/// Errors that abort a whole ingestion cycle.
///
/// Per-block fetch failures are not errors at this level: the block is
/// skipped and counted in the cycle report instead.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The chain head could not be read.
    #[error("block source: {0}")]
    Source(#[from] SourceError),
    /// A fact could not be persisted.
    #[error("fact store: {0}")]
    Store(#[from] StoreError),
}
