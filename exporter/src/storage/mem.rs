//! In-memory block fact store.
//!
//! This implementation is useful for unit tests and short-lived runs
//! (`--db-driver memory`). It keeps all facts in a `BTreeMap` keyed by
//! block number behind an `RwLock`, so the highest block is always the
//! last key.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard};

use crate::store::{BlockFactStore, StoreError};
use crate::types::{
    Aggregates, AggregationWindow, BlockFact, ClientVersionValidator, MinerClientValidator,
};

/// In-memory implementation of [`BlockFactStore`].
#[derive(Default)]
pub struct InMemoryFactStore {
    facts: RwLock<BTreeMap<u64, BlockFact>>,
}

impl InMemoryFactStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of facts currently stored.
    pub fn len(&self) -> usize {
        self.facts.read().map(|f| f.len()).unwrap_or(0)
    }

    /// Returns `true` if no facts are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<u64, BlockFact>>, StoreError> {
        self.facts.read().map_err(|_| StoreError::Poisoned)
    }

    fn window_aggregates(&self, window: AggregationWindow) -> Result<Aggregates, StoreError> {
        let facts = self.read()?;
        Ok(Aggregates::from_facts(facts.values(), window))
    }
}

impl BlockFactStore for InMemoryFactStore {
    fn upsert(&self, fact: BlockFact) -> Result<(), StoreError> {
        let mut facts = self.facts.write().map_err(|_| StoreError::Poisoned)?;
        facts.insert(fact.number, fact);
        Ok(())
    }

    fn fact(&self, number: u64) -> Result<Option<BlockFact>, StoreError> {
        Ok(self.read()?.get(&number).cloned())
    }

    fn last_processed_block(&self) -> Result<u64, StoreError> {
        Ok(self.read()?.keys().next_back().copied().unwrap_or(0))
    }

    fn aggregate_by_client_version_validator(
        &self,
        window: AggregationWindow,
    ) -> Result<BTreeMap<ClientVersionValidator, u64>, StoreError> {
        Ok(self.window_aggregates(window)?.by_client)
    }

    fn aggregate_by_miner_client_validator(
        &self,
        window: AggregationWindow,
    ) -> Result<BTreeMap<MinerClientValidator, u64>, StoreError> {
        Ok(self.window_aggregates(window)?.by_miner)
    }

    fn aggregate_empty_blocks_by_validator(
        &self,
        window: AggregationWindow,
    ) -> Result<BTreeMap<String, u64>, StoreError> {
        Ok(self.window_aggregates(window)?.empty_by_validator)
    }

    fn aggregates(&self, window: AggregationWindow) -> Result<Aggregates, StoreError> {
        self.window_aggregates(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;

    fn dummy_fact(number: u64, tx_count: u64, observed_at: u64) -> BlockFact {
        BlockFact {
            number,
            producer: Address::normalize("0xAbC"),
            validator: "Validator A".to_string(),
            client: "Geth".to_string(),
            version: "1.14.0".to_string(),
            extra_data_hex: "67657468".to_string(),
            tx_count,
            observed_at,
        }
    }

    #[test]
    fn upsert_twice_keeps_one_row_with_latest_fields() {
        let store = InMemoryFactStore::new();
        store.upsert(dummy_fact(10, 5, 1_000)).unwrap();

        let mut replacement = dummy_fact(10, 0, 2_000);
        replacement.client = "RETH".to_string();
        store.upsert(replacement.clone()).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.fact(10).unwrap(), Some(replacement));
    }

    #[test]
    fn last_processed_block_is_max_or_zero() {
        let store = InMemoryFactStore::new();
        assert_eq!(store.last_processed_block().unwrap(), 0);

        for n in [5, 42, 17] {
            store.upsert(dummy_fact(n, 1, 1_000)).unwrap();
        }
        assert_eq!(store.last_processed_block().unwrap(), 42);
    }

    #[test]
    fn aggregates_exclude_facts_older_than_window() {
        let store = InMemoryFactStore::new();
        store.upsert(dummy_fact(1, 0, 100)).unwrap();
        store.upsert(dummy_fact(2, 0, 5_000)).unwrap();

        let window = AggregationWindow::since(1_000);
        let by_client = store.aggregate_by_client_version_validator(window).unwrap();
        let by_miner = store.aggregate_by_miner_client_validator(window).unwrap();
        let empty = store.aggregate_empty_blocks_by_validator(window).unwrap();

        assert_eq!(by_client.values().sum::<u64>(), 1);
        assert_eq!(by_miner.values().sum::<u64>(), 1);
        assert_eq!(empty.get("Validator A"), Some(&1));
    }
}
