//! Storage abstraction used by the ingestion pipeline.

use std::collections::BTreeMap;

use crate::types::{
    Aggregates, AggregationWindow, BlockFact, ClientVersionValidator, MinerClientValidator,
};

/// Storage-level error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying RocksDB error.
    #[error("rocksdb: {0}")]
    RocksDb(#[from] rocksdb::Error),
    /// Required column family was not found.
    #[error("missing column family `{0}`")]
    MissingColumnFamily(&'static str),
    /// A stored value or key could not be decoded.
    #[error("corrupted record: {0}")]
    Corrupted(String),
    /// A fact could not be encoded for storage.
    #[error("failed to encode fact: {0}")]
    Encode(String),
    /// A lock guarding the backend was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Durable keyed storage for per-block facts.
///
/// Implementations can be backed by in-memory maps, RocksDB, etc. Every
/// method takes `&self`: backends serialize writers internally so that a
/// store can sit behind an `Arc` and be shared with other tasks. Stores do
/// not retry; each I/O failure is returned to the caller.
pub trait BlockFactStore: Send + Sync {
    /// Inserts `fact`, replacing any fact already stored for the same
    /// block number.
    fn upsert(&self, fact: BlockFact) -> Result<(), StoreError>;

    /// Returns the fact stored for `number`, if any.
    fn fact(&self, number: u64) -> Result<Option<BlockFact>, StoreError>;

    /// Returns the highest stored block number, or 0 for an empty store.
    fn last_processed_block(&self) -> Result<u64, StoreError>;

    /// Counts facts inside `window` grouped by client, version and validator.
    fn aggregate_by_client_version_validator(
        &self,
        window: AggregationWindow,
    ) -> Result<BTreeMap<ClientVersionValidator, u64>, StoreError>;

    /// Counts facts inside `window` grouped by miner, client and validator.
    fn aggregate_by_miner_client_validator(
        &self,
        window: AggregationWindow,
    ) -> Result<BTreeMap<MinerClientValidator, u64>, StoreError>;

    /// Counts empty blocks inside `window` grouped by validator.
    fn aggregate_empty_blocks_by_validator(
        &self,
        window: AggregationWindow,
    ) -> Result<BTreeMap<String, u64>, StoreError>;

    /// Runs all three aggregate queries.
    fn aggregates(&self, window: AggregationWindow) -> Result<Aggregates, StoreError> {
        Ok(Aggregates {
            by_client: self.aggregate_by_client_version_validator(window)?,
            by_miner: self.aggregate_by_miner_client_validator(window)?,
            empty_by_validator: self.aggregate_empty_blocks_by_validator(window)?,
        })
    }
}

impl<S: BlockFactStore + ?Sized> BlockFactStore for std::sync::Arc<S> {
    fn upsert(&self, fact: BlockFact) -> Result<(), StoreError> {
        (**self).upsert(fact)
    }

    fn fact(&self, number: u64) -> Result<Option<BlockFact>, StoreError> {
        (**self).fact(number)
    }

    fn last_processed_block(&self) -> Result<u64, StoreError> {
        (**self).last_processed_block()
    }

    fn aggregate_by_client_version_validator(
        &self,
        window: AggregationWindow,
    ) -> Result<BTreeMap<ClientVersionValidator, u64>, StoreError> {
        (**self).aggregate_by_client_version_validator(window)
    }

    fn aggregate_by_miner_client_validator(
        &self,
        window: AggregationWindow,
    ) -> Result<BTreeMap<MinerClientValidator, u64>, StoreError> {
        (**self).aggregate_by_miner_client_validator(window)
    }

    fn aggregate_empty_blocks_by_validator(
        &self,
        window: AggregationWindow,
    ) -> Result<BTreeMap<String, u64>, StoreError> {
        (**self).aggregate_empty_blocks_by_validator(window)
    }

    fn aggregates(&self, window: AggregationWindow) -> Result<Aggregates, StoreError> {
        (**self).aggregates(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Store that keeps nothing; good for checking trait-object use.
    struct NullStore;

    impl BlockFactStore for NullStore {
        fn upsert(&self, _fact: BlockFact) -> Result<(), StoreError> {
            Ok(())
        }

        fn fact(&self, _number: u64) -> Result<Option<BlockFact>, StoreError> {
            Ok(None)
        }

        fn last_processed_block(&self) -> Result<u64, StoreError> {
            Ok(0)
        }

        fn aggregate_by_client_version_validator(
            &self,
            _window: AggregationWindow,
        ) -> Result<BTreeMap<ClientVersionValidator, u64>, StoreError> {
            Ok(BTreeMap::new())
        }

        fn aggregate_by_miner_client_validator(
            &self,
            _window: AggregationWindow,
        ) -> Result<BTreeMap<MinerClientValidator, u64>, StoreError> {
            Ok(BTreeMap::new())
        }

        fn aggregate_empty_blocks_by_validator(
            &self,
            _window: AggregationWindow,
        ) -> Result<BTreeMap<String, u64>, StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    #[test]
    fn block_fact_store_is_object_safe_and_shareable() {
        let store: Arc<dyn BlockFactStore> = Arc::new(NullStore);
        assert_eq!(store.last_processed_block().unwrap(), 0);
        assert!(store.fact(1).unwrap().is_none());
    }

    #[test]
    fn aggregates_surfaces_the_first_failing_query() {
        let err = NullStore
            .aggregates(AggregationWindow::since(0))
            .expect_err("empty-block query fails");
        assert!(matches!(err, StoreError::Poisoned));
    }
}
