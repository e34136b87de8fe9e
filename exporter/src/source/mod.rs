//! Block sources.
//!
//! A [`BlockSource`] is the exporter's only view of the chain: it reports
//! the current head and returns the few header fields the pipeline needs
//! for a given block number. [`http::HttpBlockSource`] talks to an
//! execution node over Ethereum JSON-RPC.

use async_trait::async_trait;

pub mod http;

pub use http::HttpBlockSource;

/// The subset of a block the ingestion pipeline consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawBlock {
    pub number: u64,
    /// Producer / fee recipient as reported by the node (not normalized).
    pub producer: String,
    /// `extraData` as lower-case hex without `0x`.
    pub extra_data_hex: String,
    pub tx_count: u64,
}

/// Errors that can occur while talking to the block source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Transport-level error (e.g. connection refused, timeout).
    #[error("transport error: {0}")]
    Transport(String),
    /// The node returned a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// The node returned a malformed or unexpected response.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The node does not know the requested block.
    #[error("block {0} not found")]
    BlockNotFound(u64),
}

/// Abstract chain access used by the ingestion pipeline.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Returns the number of the latest block known to the node.
    async fn chain_head(&self) -> Result<u64, SourceError>;

    /// Fetches block `number`.
    async fn block_by_number(&self, number: u64) -> Result<RawBlock, SourceError>;

    /// Endpoint description used in logs.
    fn endpoint(&self) -> String;
}
