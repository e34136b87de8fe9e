//! Aggregation windows, keys and result bundles.
//!
//! Aggregates are returned as `BTreeMap`s so that iteration order is stable,
//! which keeps the published label series and the tests deterministic.

use std::collections::BTreeMap;
use std::time::Duration;

use super::{BlockFact, current_unix_timestamp};

/// Default trailing window for aggregate queries.
pub const DEFAULT_AGGREGATION_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Trailing time window used by aggregate queries.
///
/// A fact is inside the window iff `fact.observed_at > cutoff`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggregationWindow {
    cutoff: u64,
}

impl AggregationWindow {
    /// Window covering the last `span` seconds up to now.
    pub fn trailing(span: Duration) -> Self {
        Self::ending_at(current_unix_timestamp(), span)
    }

    /// Window covering `span` seconds up to the timestamp `now`.
    pub fn ending_at(now: u64, span: Duration) -> Self {
        Self {
            cutoff: now.saturating_sub(span.as_secs()),
        }
    }

    /// Window including every fact observed strictly after `cutoff`.
    pub fn since(cutoff: u64) -> Self {
        Self { cutoff }
    }

    /// Exclusive lower bound on `observed_at`.
    pub fn cutoff(&self) -> u64 {
        self.cutoff
    }

    /// Returns `true` if `fact` falls inside the window.
    pub fn contains(&self, fact: &BlockFact) -> bool {
        fact.observed_at > self.cutoff
    }
}

impl Default for AggregationWindow {
    fn default() -> Self {
        Self::trailing(DEFAULT_AGGREGATION_WINDOW)
    }
}

/// Key of the `client_blocks` aggregate.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientVersionValidator {
    pub client: String,
    pub version: String,
    pub validator: String,
}

impl ClientVersionValidator {
    pub fn of(fact: &BlockFact) -> Self {
        Self {
            client: fact.client.clone(),
            version: fact.version.clone(),
            validator: fact.validator.clone(),
        }
    }
}

/// Key of the `miner_blocks` aggregate.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MinerClientValidator {
    pub miner: String,
    pub client: String,
    pub validator: String,
}

impl MinerClientValidator {
    pub fn of(fact: &BlockFact) -> Self {
        Self {
            miner: fact.producer.as_str().to_string(),
            client: fact.client.clone(),
            validator: fact.validator.clone(),
        }
    }
}

/// The three windowed aggregates published after every batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Aggregates {
    pub by_client: BTreeMap<ClientVersionValidator, u64>,
    pub by_miner: BTreeMap<MinerClientValidator, u64>,
    pub empty_by_validator: BTreeMap<String, u64>,
}

impl Aggregates {
    /// Folds facts into aggregates, skipping those outside `window`.
    ///
    /// Store backends that cannot push the grouping down to the storage
    /// engine share this routine.
    pub fn from_facts<'a>(
        facts: impl IntoIterator<Item = &'a BlockFact>,
        window: AggregationWindow,
    ) -> Self {
        let mut out = Self::default();
        for fact in facts.into_iter().filter(|f| window.contains(f)) {
            out.add(fact);
        }
        out
    }

    /// Counts a single fact into all three aggregates.
    pub fn add(&mut self, fact: &BlockFact) {
        *self
            .by_client
            .entry(ClientVersionValidator::of(fact))
            .or_default() += 1;
        *self
            .by_miner
            .entry(MinerClientValidator::of(fact))
            .or_default() += 1;
        if fact.is_empty() {
            *self
                .empty_by_validator
                .entry(fact.validator.clone())
                .or_default() += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;

    fn fact(number: u64, validator: &str, tx_count: u64, observed_at: u64) -> BlockFact {
        BlockFact {
            number,
            producer: Address::normalize("0x01"),
            validator: validator.to_string(),
            client: "Geth".to_string(),
            version: "1.14.0".to_string(),
            extra_data_hex: String::new(),
            tx_count,
            observed_at,
        }
    }

    #[test]
    fn window_cutoff_is_exclusive() {
        let window = AggregationWindow::ending_at(1_000, Duration::from_secs(100));
        assert_eq!(window.cutoff(), 900);
        assert!(!window.contains(&fact(1, "a", 1, 900)));
        assert!(window.contains(&fact(1, "a", 1, 901)));
    }

    #[test]
    fn window_saturates_near_epoch() {
        let window = AggregationWindow::ending_at(10, Duration::from_secs(100));
        assert_eq!(window.cutoff(), 0);
    }

    #[test]
    fn from_facts_groups_and_filters() {
        let facts = vec![
            fact(1, "alice", 0, 500),
            fact(2, "alice", 4, 500),
            fact(3, "bob", 0, 500),
            fact(4, "bob", 0, 10),
        ];
        let aggs = Aggregates::from_facts(&facts, AggregationWindow::since(100));

        let alice = ClientVersionValidator {
            client: "Geth".to_string(),
            version: "1.14.0".to_string(),
            validator: "alice".to_string(),
        };
        assert_eq!(aggs.by_client.get(&alice), Some(&2));
        assert_eq!(aggs.by_miner.values().sum::<u64>(), 3);
        assert_eq!(aggs.empty_by_validator.get("alice"), Some(&1));
        assert_eq!(aggs.empty_by_validator.get("bob"), Some(&1));
    }
}
