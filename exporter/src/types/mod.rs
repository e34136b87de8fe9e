//! Core domain types used by the exporter.
//!
//! This module defines the normalized producer address, the per-block fact
//! that is persisted by the store, and the aggregation keys returned by
//! windowed queries. The goal is to avoid passing "naked" strings around
//! for values that carry a normalization rule.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Aggregation keys and result bundles.
pub mod aggregate;
/// Per-block facts.
pub mod fact;

pub use aggregate::{
    Aggregates, AggregationWindow, ClientVersionValidator, DEFAULT_AGGREGATION_WINDOW,
    MinerClientValidator,
};
pub use fact::{BlockFact, unknown_validator_label};

/// Lower-case, `0x`-prefixed account identifier of a block producer.
///
/// Every address that enters the exporter (block `miner` fields, keys of
/// the validator name file) goes through [`Address::normalize`], so two
/// spellings of the same account always compare equal.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Normalizes an address string: lower-cases it and adds a `0x`
    /// prefix when missing. Surrounding whitespace is dropped.
    pub fn normalize(raw: &str) -> Self {
        let lower = raw.trim().to_ascii_lowercase();
        if lower.starts_with("0x") {
            Address(lower)
        } else {
            Address(format!("0x{lower}"))
        }
    }

    /// Returns the normalized string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the current wall-clock time as seconds since Unix epoch.
///
/// On error (system clock before epoch) this falls back to 0.
pub fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_prefix_and_lowercases() {
        let addr = Address::normalize("AbCDef0123");
        assert_eq!(addr.as_str(), "0xabcdef0123");
    }

    #[test]
    fn normalize_keeps_existing_prefix() {
        let a = Address::normalize("0xABCDEF");
        let b = Address::normalize("0XabcDEF");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "0xabcdef");
    }
}
