//! Execution-client detection rules.
//!
//! Rules live in an ordered `Vec`: when metadata mentions two clients, the
//! rule declared first wins.

use std::fmt;

use regex::Regex;

/// Execution client families the detector can recognise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecutionClient {
    Geth,
    Reth,
    Nethermind,
    Erigon,
    Besu,
    EthereumJs,
    Unknown,
}

impl ExecutionClient {
    /// Name used in stored facts and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionClient::Geth => "Geth",
            ExecutionClient::Reth => "RETH",
            ExecutionClient::Nethermind => "Nethermind",
            ExecutionClient::Erigon => "Erigon",
            ExecutionClient::Besu => "Besu",
            ExecutionClient::EthereumJs => "EthereumJS",
            ExecutionClient::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ExecutionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signatures and version patterns for one client.
#[derive(Clone, Debug)]
pub struct DetectionRule {
    pub client: ExecutionClient,
    /// Substrings matched case-insensitively, tried in order.
    pub signatures: Vec<&'static str>,
    /// Version extractors, tried in order; capture group 1 is the version.
    pub versions: Vec<Regex>,
}

impl DetectionRule {
    /// Builds a rule from hard-coded pattern literals.
    ///
    /// Panics if a pattern does not compile, which can only happen when the
    /// built-in table itself is wrong.
    fn new(client: ExecutionClient, signatures: &[&'static str], versions: &[&str]) -> Self {
        let versions = versions
            .iter()
            .map(|p| {
                Regex::new(&format!("(?i){p}"))
                    .expect("built-in version pattern should compile")
            })
            .collect();
        Self {
            client,
            signatures: signatures.to_vec(),
            versions,
        }
    }

    /// Returns the first declared signature contained in `haystack`,
    /// ignoring ASCII case on both sides.
    pub fn matching_signature(&self, haystack: &str) -> Option<&'static str> {
        let haystack = haystack.to_ascii_lowercase();
        self.signatures
            .iter()
            .copied()
            .find(|sig| haystack.contains(&sig.to_ascii_lowercase()))
    }

    /// Extracts a version from `haystack` using the first pattern whose
    /// capture group is non-empty.
    pub fn extract_version(&self, haystack: &str) -> Option<String> {
        self.versions.iter().find_map(|re| {
            re.captures(haystack)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
    }
}

/// Hex encodings of ASCII tokens that identify a client when neither the
/// decoded metadata nor the hint matched any signature.
pub const HEX_SIGNATURES: &[(&str, ExecutionClient)] = &[
    // "geth"
    ("67657468", ExecutionClient::Geth),
    // "go-ethereum"
    ("676f2d657468657265756d", ExecutionClient::Geth),
];

/// The built-in rule table, in tie-break order.
pub fn default_rules() -> Vec<DetectionRule> {
    vec![
        DetectionRule::new(
            ExecutionClient::Geth,
            &["go-ethereum", "geth"],
            &[r"geth/v?([\d.]+)", r"go([\d.]+)"],
        ),
        DetectionRule::new(
            ExecutionClient::Reth,
            &["reth"],
            &[r"reth/v?([\d.]+)", r"reth/(v[\d.]+)"],
        ),
        DetectionRule::new(
            ExecutionClient::Nethermind,
            &["nethermind", "nethm"],
            &[
                r"nethermind/v?([\d.]+)",
                r"nethermind_([\d.]+)",
                r"nethm/([\d.]+)",
            ],
        ),
        DetectionRule::new(
            ExecutionClient::Erigon,
            &["erigon", "thorax/erigon", "erigontech/erigon"],
            &[
                r"erigon/v?([\d.]+)",
                r"erigon_([\d.]+)",
                r"thorax/erigon:v([\d.]+)",
                r"erigontech/erigon:v([\d.]+)",
            ],
        ),
        DetectionRule::new(
            ExecutionClient::Besu,
            &["besu", "hyperledger"],
            &[r"besu/v?([\d.]+)", r"hyperledger-besu/([\d.]+)"],
        ),
        DetectionRule::new(
            ExecutionClient::EthereumJs,
            &["ethereumjs", "ethereum-js"],
            &[r"ethereumjs/v?([\d.]+)", r"ethereum-js/([\d.]+)"],
        ),
    ]
}
