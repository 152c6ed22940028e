//! Ethereum JSON-RPC client over HTTP

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::address::EvmAddress;
use crate::error::ChainError;

/// Receipt fields this crate cares about
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub block_number: Option<String>,
}

impl TransactionReceipt {
    /// Post-Byzantium success flag (`status == 1`)
    pub fn succeeded(&self) -> bool {
        self.status
            .as_deref()
            .and_then(|s| parse_quantity(s).ok())
            .is_some_and(|s| s == 1)
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Parse a hex quantity such as `0x1a`
pub fn parse_quantity(s: &str) -> Result<u128, ChainError> {
    let digits = s.trim().strip_prefix("0x").unwrap_or(s.trim());
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Decode(format!("bad quantity '{}': {}", s, e)))
}

/// Parse a hex quantity that must fit in 64 bits (chain id, nonce, gas)
pub fn parse_quantity_u64(s: &str) -> Result<u64, ChainError> {
    u64::try_from(parse_quantity(s)?)
        .map_err(|_| ChainError::Decode(format!("quantity '{}' does not fit in 64 bits", s)))
}

fn quantity(value: u128) -> String {
    format!("0x{:x}", value)
}

/// Thin JSON-RPC client for a single node endpoint
pub struct EthRpc {
    http: Client,
    url: String,
    next_id: AtomicU64,
}

impl EthRpc {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!("eth rpc {} -> {}", method, self.url);

        let resp = self.http.post(&self.url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(ChainError::Transport(format!(
                "{} returned HTTP {}",
                method,
                resp.status()
            )));
        }

        let envelope: RpcEnvelope = resp
            .json()
            .await
            .map_err(|e| ChainError::Decode(e.to_string()))?;
        if let Some(err) = envelope.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        serde_json::from_value(envelope.result.unwrap_or(Value::Null))
            .map_err(|e| ChainError::Decode(format!("{}: {}", method, e)))
    }

    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        let raw: String = self.request("eth_chainId", json!([])).await?;
        parse_quantity_u64(&raw)
    }

    pub async fn gas_price(&self) -> Result<u128, ChainError> {
        let raw: String = self.request("eth_gasPrice", json!([])).await?;
        parse_quantity(&raw)
    }

    pub async fn transaction_count(&self, address: &EvmAddress) -> Result<u64, ChainError> {
        let raw: String = self
            .request(
                "eth_getTransactionCount",
                json!([address.to_lower_hex(), "pending"]),
            )
            .await?;
        parse_quantity_u64(&raw)
    }

    pub async fn estimate_gas(
        &self,
        from: &EvmAddress,
        to: &EvmAddress,
        value: u128,
        data: &[u8],
    ) -> Result<u64, ChainError> {
        let raw: String = self
            .request(
                "eth_estimateGas",
                json!([{
                    "from": from.to_lower_hex(),
                    "to": to.to_lower_hex(),
                    "value": quantity(value),
                    "data": format!("0x{}", hex::encode(data)),
                }]),
            )
            .await?;
        parse_quantity_u64(&raw)
    }

    /// Read-only contract call against the latest block
    pub async fn call(&self, to: &EvmAddress, data: &[u8]) -> Result<Vec<u8>, ChainError> {
        let raw: String = self
            .request(
                "eth_call",
                json!([{
                    "to": to.to_lower_hex(),
                    "data": format!("0x{}", hex::encode(data)),
                }, "latest"]),
            )
            .await?;
        let digits = raw.strip_prefix("0x").unwrap_or(&raw);
        hex::decode(digits).map_err(|e| ChainError::Decode(e.to_string()))
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, ChainError> {
        self.request(
            "eth_sendRawTransaction",
            json!([format!("0x{}", hex::encode(raw))]),
        )
        .await
    }

    pub async fn transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        self.request("eth_getTransactionReceipt", json!([tx_hash])).await
    }

    /// Poll for a receipt, giving up after `attempts` tries
    pub async fn wait_for_receipt(
        &self,
        tx_hash: &str,
        attempts: u32,
        interval: Duration,
    ) -> Result<TransactionReceipt, ChainError> {
        for attempt in 0..attempts.max(1) {
            if let Some(receipt) = self.transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }
            debug!("receipt for {} not ready (attempt {})", tx_hash, attempt + 1);
            tokio::time::sleep(interval).await;
        }
        Err(ChainError::ReceiptTimeout(tx_hash.to_string()))
    }
}
