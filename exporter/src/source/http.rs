//! HTTP JSON-RPC block source.
//!
//! This implementation of [`BlockSource`] talks to an Ethereum execution
//! node over JSON-RPC 2.0. Only two methods are used:
//!
//! ```json
//! {"jsonrpc":"2.0","id":1,"method":"eth_blockNumber","params":[]}
//! -> {"jsonrpc":"2.0","id":1,"result":"0x1b4"}
//!
//! {"jsonrpc":"2.0","id":2,"method":"eth_getBlockByNumber","params":["0x1b4", false]}
//! -> {"jsonrpc":"2.0","id":2,"result":{
//!      "number":"0x1b4","miner":"0x...","extraData":"0xd883...","transactions":["0x.."]
//!    }}
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{BlockSource, RawBlock, SourceError};

/// JSON-RPC block source.
///
/// The underlying `reqwest` client is cheap to clone and pools connections,
/// so a single source can serve the whole process.
pub struct HttpBlockSource {
    url: String,
    client: Client,
    next_id: AtomicU64,
}

impl HttpBlockSource {
    /// Constructs a new source pointing at `url`, e.g.
    /// `"http://127.0.0.1:8545"`. Every request is bounded by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<Option<T>, SourceError> {
        let req = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| SourceError::Transport(format!("{method} to {} failed: {e}", self.url)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Transport(format!(
                "{method} to {} returned HTTP status {status}",
                self.url
            )));
        }

        let body = resp
            .json::<RpcResponse<T>>()
            .await
            .map_err(|e| SourceError::Protocol(format!("failed to parse {method} response: {e}")))?;

        body.into_result()
    }
}

/// Internal request payload.
#[derive(Debug, Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Internal response envelope.
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

impl<T> RpcResponse<T> {
    fn into_result(self) -> Result<Option<T>, SourceError> {
        match self.error {
            Some(err) => Err(SourceError::Rpc {
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.result),
        }
    }
}

/// Fields of `eth_getBlockByNumber` we care about.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: String,
    miner: String,
    #[serde(default)]
    extra_data: String,
    /// Hashes or full objects, depending on the request flag.
    #[serde(default)]
    transactions: Vec<Value>,
}

impl RpcBlock {
    fn into_raw(self, requested: u64) -> Result<RawBlock, SourceError> {
        let number = parse_quantity(&self.number)?;
        if number != requested {
            return Err(SourceError::Protocol(format!(
                "asked for block {requested}, node returned {number}"
            )));
        }
        let extra = self
            .extra_data
            .strip_prefix("0x")
            .unwrap_or(&self.extra_data)
            .to_ascii_lowercase();
        Ok(RawBlock {
            number,
            producer: self.miner,
            extra_data_hex: extra,
            tx_count: self.transactions.len() as u64,
        })
    }
}

/// Parses a JSON-RPC hex quantity such as `"0x1b4"`.
fn parse_quantity(s: &str) -> Result<u64, SourceError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| SourceError::Protocol(format!("quantity without 0x prefix: {s:?}")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| SourceError::Protocol(format!("invalid quantity {s:?}: {e}")))
}

fn format_quantity(n: u64) -> String {
    format!("0x{n:x}")
}

#[async_trait]
impl BlockSource for HttpBlockSource {
    async fn chain_head(&self) -> Result<u64, SourceError> {
        let head: Option<String> = self.call("eth_blockNumber", Vec::new()).await?;
        let head = head.ok_or_else(|| {
            SourceError::Protocol("eth_blockNumber returned no result".to_string())
        })?;
        parse_quantity(&head)
    }

    async fn block_by_number(&self, number: u64) -> Result<RawBlock, SourceError> {
        let params = vec![Value::String(format_quantity(number)), Value::Bool(false)];
        let block: Option<RpcBlock> = self.call("eth_getBlockByNumber", params).await?;
        block
            .ok_or(SourceError::BlockNotFound(number))?
            .into_raw(number)
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_roundtrip_through_hex() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert_eq!(format_quantity(436), "0x1b4");
        assert!(parse_quantity("1b4").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn block_response_can_be_deserialized() {
        let json = r#"
        {
          "jsonrpc": "2.0",
          "id": 7,
          "result": {
            "number": "0x64",
            "miner": "0x4838B106FCe9647Bdf1E7877BF73cE8B0BAD5f97",
            "extraData": "0x546974616E2028746974616E6275696C6465722E78797A29",
            "transactions": ["0xaa", "0xbb", "0xcc"],
            "gasUsed": "0x0"
          }
        }
        "#;

        let resp: RpcResponse<RpcBlock> = serde_json::from_str(json).expect("response should parse");
        let block = resp.into_result().unwrap().expect("block present");
        let raw = block.into_raw(100).expect("convert");

        assert_eq!(raw.number, 100);
        assert_eq!(raw.tx_count, 3);
        assert_eq!(raw.producer, "0x4838B106FCe9647Bdf1E7877BF73cE8B0BAD5f97");
        assert_eq!(raw.extra_data_hex, "546974616e2028746974616e6275696c6465722e78797a29");
    }

    #[test]
    fn null_result_means_missing_block() {
        let resp: RpcResponse<RpcBlock> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert!(resp.into_result().unwrap().is_none());
    }

    #[test]
    fn rpc_error_object_is_surfaced() {
        let resp: RpcResponse<String> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"header not found"}}"#,
        )
        .unwrap();
        match resp.into_result() {
            Err(SourceError::Rpc { code, message }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "header not found");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn mismatched_block_number_is_a_protocol_error() {
        let block = RpcBlock {
            number: "0x65".to_string(),
            miner: "0x01".to_string(),
            extra_data: "0x".to_string(),
            transactions: Vec::new(),
        };
        assert!(matches!(block.into_raw(100), Err(SourceError::Protocol(_))));
    }
}
