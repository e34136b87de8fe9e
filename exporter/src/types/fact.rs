// exporter/src/types/fact.rs

//! Per-block facts.
//!
//! A [`BlockFact`] is everything the exporter learns about one block: who
//! produced it, which execution client built it, and how many transactions
//! it carries. Facts are keyed by block number in the store.
//!
//! Serialization is done with **bincode 2** using the `serde` integration
//! (`bincode::serde::encode_to_vec`) and an explicit `standard()` config by
//! the RocksDB backend.

use serde::{Deserialize, Serialize};

use super::Address;

/// Label used for producers that are missing from the validator name map.
pub fn unknown_validator_label(producer: &Address) -> String {
    format!("Unknown Validator ({producer})")
}

/// One ingested block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFact {
    /// Block number; primary key in every store.
    pub number: u64,
    /// Normalized fee recipient / producer address.
    pub producer: Address,
    /// Display name of the validator operating `producer`.
    pub validator: String,
    /// Execution client name, e.g. `"Geth"`, or `"Unknown"`.
    pub client: String,
    /// Client version; empty when the metadata carries none.
    pub version: String,
    /// Raw `extraData` as lower-case hex without `0x`, kept for audit.
    pub extra_data_hex: String,
    /// Number of transactions in the block.
    pub tx_count: u64,
    /// Wall-clock ingestion time in seconds since Unix epoch.
    ///
    /// This is *not* the block timestamp: windowed aggregates are about
    /// what the exporter saw recently.
    pub observed_at: u64,
}

impl BlockFact {
    /// Returns `true` if the block carries no transactions.
    pub fn is_empty(&self) -> bool {
        self.tx_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_flag_follows_tx_count() {
        let mut fact = BlockFact {
            number: 7,
            producer: Address::normalize("0xAA"),
            validator: "v".to_string(),
            client: "Geth".to_string(),
            version: String::new(),
            extra_data_hex: String::new(),
            tx_count: 0,
            observed_at: 0,
        };
        assert!(fact.is_empty());

        fact.tx_count = 3;
        assert!(!fact.is_empty());
    }

    #[test]
    fn unknown_label_embeds_normalized_address() {
        let label = unknown_validator_label(&Address::normalize("DEADBEEF"));
        assert_eq!(label, "Unknown Validator (0xdeadbeef)");
    }
}
