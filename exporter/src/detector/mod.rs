//! Execution-client detection from block producer metadata.
//!
//! Block builders usually stamp their client name and version into the
//! block's `extraData` field (e.g. `geth/v1.14.11-stable/linux-amd64/go1.23.2`
//! RLP-wrapped, or plain `reth/v1.1.0`). [`ClientDetector`] turns that raw
//! hex blob into a `(client, version)` pair.
//!
//! Detection never fails: anything unrecognisable, including malformed hex,
//! resolves to [`ExecutionClient::Unknown`] with an empty version.

pub mod rules;

pub use rules::{DetectionRule, ExecutionClient, HEX_SIGNATURES, default_rules};

/// Result of running the detector over one block's metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Detection {
    pub client: ExecutionClient,
    /// Empty when no version pattern matched.
    pub version: String,
}

impl Detection {
    fn unknown() -> Self {
        Self {
            client: ExecutionClient::Unknown,
            version: String::new(),
        }
    }
}

/// Maps raw producer metadata to a client and version.
///
/// The rule table is immutable after construction, so a detector can be
/// shared freely between tasks.
#[derive(Clone, Debug)]
pub struct ClientDetector {
    rules: Vec<DetectionRule>,
}

impl Default for ClientDetector {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl ClientDetector {
    /// Creates a detector with a custom rule table. Earlier rules win ties.
    pub fn new(rules: Vec<DetectionRule>) -> Self {
        Self { rules }
    }

    /// Detects the client that produced a block.
    ///
    /// `extra_data_hex` may carry a `0x` prefix. `hint` is optional free
    /// text (e.g. a client string reported out of band) searched first.
    pub fn detect(&self, extra_data_hex: &str, hint: Option<&str>) -> Detection {
        let raw_hex = extra_data_hex.to_ascii_lowercase();

        for candidate in search_candidates(&raw_hex, hint) {
            for rule in &self.rules {
                if rule.matching_signature(&candidate).is_some() {
                    return Detection {
                        client: rule.client,
                        version: rule.extract_version(&candidate).unwrap_or_default(),
                    };
                }
            }
        }

        HEX_SIGNATURES
            .iter()
            .find(|(sig, _)| raw_hex.contains(sig))
            .map(|(_, client)| Detection {
                client: *client,
                version: String::new(),
            })
            .unwrap_or_else(Detection::unknown)
    }
}

/// Builds the ordered list of lower-cased strings to search: hint, decoded
/// metadata (skipped when the hex does not decode), raw hex.
fn search_candidates(raw_hex: &str, hint: Option<&str>) -> Vec<String> {
    let mut out = Vec::with_capacity(3);

    if let Some(text) = hint {
        out.push(text.to_lowercase());
    }

    let stripped = raw_hex.strip_prefix("0x").unwrap_or(raw_hex);
    if let Ok(bytes) = hex::decode(stripped) {
        out.push(String::from_utf8_lossy(&bytes).to_lowercase());
    }

    out.push(raw_hex.to_string());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(hex: &str, hint: Option<&str>) -> (String, String) {
        let d = ClientDetector::default().detect(hex, hint);
        (d.client.to_string(), d.version)
    }

    #[test]
    fn go_ethereum_hex_is_geth() {
        let (client, _) = detect("676f2d657468657265756d", None);
        assert_eq!(client, "Geth");
    }

    #[test]
    fn rlp_wrapped_geth_extra_data_yields_version() {
        // d883 010e0b 84 "geth" 88 "go1.23.2" 85 "linux"
        let mut bytes = vec![0xd8, 0x83, 0x01, 0x0e, 0x0b, 0x84];
        bytes.extend_from_slice(b"geth/v1.14.11");
        bytes.extend_from_slice(b"-stable/go1.23.2");
        let (client, version) = detect(&hex::encode(&bytes), None);
        assert_eq!(client, "Geth");
        assert_eq!(version, "1.14.11");
    }

    #[test]
    fn prefixed_hex_is_accepted() {
        let hex = format!("0x{}", hex::encode("reth/v1.1.0-abcdef/x86_64-unknown-linux-gnu"));
        let (client, version) = detect(&hex, None);
        assert_eq!(client, "RETH");
        assert_eq!(version, "1.1.0");
    }

    #[test]
    fn nethermind_without_version_returns_empty_version() {
        let (client, version) = detect(&hex::encode("Nethermind"), None);
        assert_eq!(client, "Nethermind");
        assert_eq!(version, "");
    }

    #[test]
    fn hint_is_searched_before_metadata() {
        let (client, version) = detect(&hex::encode("geth/v1.0.0"), Some("Besu/v24.1.0"));
        assert_eq!(client, "Besu");
        assert_eq!(version, "24.1.0");
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let metadata = hex::encode("reth/v1.2.0 geth/v1.13.0");
        for _ in 0..50 {
            let (client, version) = detect(&metadata, None);
            assert_eq!(client, "Geth");
            assert_eq!(version, "1.13.0");
        }
    }

    #[test]
    fn detection_is_deterministic() {
        let detector = ClientDetector::default();
        let input = hex::encode("erigon/2.60.1/linux-amd64");
        let first = detector.detect(&input, Some("whatever"));
        let second = detector.detect(&input, Some("whatever"));
        assert_eq!(first, second);
        assert_eq!(first.client, ExecutionClient::Erigon);
        assert_eq!(first.version, "2.60.1");
    }

    #[test]
    fn malformed_hex_degrades_to_unknown() {
        for input in ["zz-not-hex", "0x123", "", "0x", "\u{0000}\u{ffff}"] {
            let (client, version) = detect(input, None);
            assert_eq!(client, "Unknown", "input {input:?}");
            assert_eq!(version, "");
        }
    }

    #[test]
    fn odd_length_hex_falls_back_to_hex_signatures() {
        // Odd length cannot be decoded, but still contains "geth" in hex.
        let (client, version) = detect("67657468f", None);
        assert_eq!(client, "Geth");
        assert_eq!(version, "");
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let mut bytes = vec![0xff, 0xfe];
        bytes.extend_from_slice(b"besu");
        let (client, _) = detect(&hex::encode(bytes), None);
        assert_eq!(client, "Besu");
    }
}
