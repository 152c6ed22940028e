//! Task contract binding
//!
//! The contract keeps one record per task uuid:
//!
//! - `confirmTask(uint256 uuid, address serviceAgent) payable`
//! - `completeTask(uint256 uuid)`
//! - `tasks(uint256) -> (taskAgent, serviceAgent, isCompleted, createdAt, lastestCompletedAt, payAmount)`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::address::EvmAddress;
use crate::error::ChainError;
use crate::rpc::{EthRpc, TransactionReceipt};
use crate::signer::{EthSigner, keccak256};
use crate::tx::LegacyTransaction;

// ── Task uuid ──────────────────────────────────────────────────────────────

/// 256-bit on-chain task identifier, big-endian
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskUuid([u8; 32]);

impl TaskUuid {
    /// Derive from a session id: drop `-`, parse as hex, keep the low 256 bits.
    /// The same session id always yields the same uuid.
    pub fn from_session_id(session_id: &str) -> Result<Self, ChainError> {
        let trimmed = session_id.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let digits: String = body.chars().filter(|c| *c != '-').collect();
        if digits.is_empty() {
            return Err(ChainError::InvalidSessionId("empty session id".into()));
        }
        if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(ChainError::InvalidSessionId(format!(
                "'{}' is not a hex digit",
                bad
            )));
        }

        // mod 2^256 keeps the last 64 hex digits
        let tail = if digits.len() > 64 {
            &digits[digits.len() - 64..]
        } else {
            digits.as_str()
        };
        let padded = format!("{:0>64}", tail);
        let bytes = hex::decode(&padded).map_err(|e| ChainError::InvalidSessionId(e.to_string()))?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Base-10 rendering, matching how block explorers show the uuid
    pub fn to_decimal(&self) -> String {
        let mut digits = Vec::new();
        let mut n = self.0;
        while n.iter().any(|b| *b != 0) {
            let mut rem: u32 = 0;
            for byte in n.iter_mut() {
                let cur = (rem << 8) | *byte as u32;
                *byte = (cur / 10) as u8;
                rem = cur % 10;
            }
            digits.push(b'0' + rem as u8);
        }
        if digits.is_empty() {
            return "0".to_string();
        }
        digits.reverse();
        String::from_utf8(digits).unwrap_or_default()
    }
}

impl std::fmt::Display for TaskUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

// ── Records ────────────────────────────────────────────────────────────────

/// Decoded `tasks(uuid)` record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnChainTask {
    pub task_agent: EvmAddress,
    pub service_agent: EvmAddress,
    pub is_completed: bool,
    pub created_at: u64,
    pub last_completed_at: u64,
    pub pay_amount: u128,
}

/// Access to the task contract, as seen by agents
#[async_trait]
pub trait TaskLedger: Send + Sync {
    async fn task(&self, uuid: &TaskUuid) -> Result<OnChainTask, ChainError>;

    async fn receipt(&self, tx_hash: &str) -> Result<Option<TransactionReceipt>, ChainError>;

    /// Register the task for `service_agent`, paying `bounty_wei`
    async fn confirm_task(
        &self,
        uuid: &TaskUuid,
        service_agent: &EvmAddress,
        bounty_wei: u128,
    ) -> Result<TransactionReceipt, ChainError>;

    async fn complete_task(&self, uuid: &TaskUuid) -> Result<TransactionReceipt, ChainError>;
}

// ── ABI helpers ────────────────────────────────────────────────────────────

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn address_word(address: &EvmAddress) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

fn encode_call(signature: &str, words: &[[u8; 32]]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 * words.len());
    data.extend_from_slice(&selector(signature));
    for word in words {
        data.extend_from_slice(word);
    }
    data
}

fn word_to_u128(word: &[u8]) -> Result<u128, ChainError> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(ChainError::Abi("integer does not fit in 128 bits".into()));
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&word[16..32]);
    Ok(u128::from_be_bytes(buf))
}

fn word_to_u64(word: &[u8]) -> Result<u64, ChainError> {
    u64::try_from(word_to_u128(word)?)
        .map_err(|_| ChainError::Decode("timestamp does not fit in 64 bits".into()))
}

fn word_to_address(word: &[u8]) -> EvmAddress {
    let mut buf = [0u8; 20];
    buf.copy_from_slice(&word[12..32]);
    EvmAddress::from_bytes(buf)
}

/// Decode the six-word return of `tasks(uint256)`
pub fn decode_task_record(data: &[u8]) -> Result<OnChainTask, ChainError> {
    if data.len() < 6 * 32 {
        return Err(ChainError::Abi(format!(
            "tasks() returned {} bytes, expected 192",
            data.len()
        )));
    }
    let word = |i: usize| &data[i * 32..(i + 1) * 32];
    Ok(OnChainTask {
        task_agent: word_to_address(word(0)),
        service_agent: word_to_address(word(1)),
        is_completed: word_to_u128(word(2))? != 0,
        created_at: word_to_u64(word(3))?,
        last_completed_at: word_to_u64(word(4))?,
        pay_amount: word_to_u128(word(5))?,
    })
}

// ── Contract client ────────────────────────────────────────────────────────

/// Node and contract coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_contract")]
    pub contract_address: String,
    #[serde(default = "default_receipt_attempts")]
    pub receipt_attempts: u32,
    #[serde(default = "default_receipt_interval_ms")]
    pub receipt_interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545/".to_string()
}

fn default_contract() -> String {
    "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string()
}

fn default_receipt_attempts() -> u32 {
    60
}

fn default_receipt_interval_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            contract_address: default_contract(),
            receipt_attempts: default_receipt_attempts(),
            receipt_interval_ms: default_receipt_interval_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// The task contract reached through a JSON-RPC node
pub struct TaskContract {
    rpc: EthRpc,
    address: EvmAddress,
    signer: Option<EthSigner>,
    receipt_attempts: u32,
    receipt_interval: Duration,
}

impl TaskContract {
    pub fn new(config: &ChainConfig, signer: Option<EthSigner>) -> Result<Self, ChainError> {
        let rpc = EthRpc::new(&config.rpc_url, Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            rpc,
            address: config.contract_address.parse()?,
            signer,
            receipt_attempts: config.receipt_attempts,
            receipt_interval: Duration::from_millis(config.receipt_interval_ms),
        })
    }

    pub fn address(&self) -> EvmAddress {
        self.address
    }

    pub fn signer_address(&self) -> Option<EvmAddress> {
        self.signer.as_ref().map(EthSigner::address)
    }

    async fn transact(&self, value: u128, data: Vec<u8>) -> Result<TransactionReceipt, ChainError> {
        let signer = self.signer.as_ref().ok_or(ChainError::NoSigner)?;
        let from = signer.address();

        let chain_id = self.rpc.chain_id().await?;
        let nonce = self.rpc.transaction_count(&from).await?;
        let gas_price = self.rpc.gas_price().await?;
        let gas_limit = self.rpc.estimate_gas(&from, &self.address, value, &data).await?;

        let tx = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit,
            to: self.address,
            value,
            data,
            chain_id,
        };
        let raw = tx.sign(signer)?;
        let tx_hash = self.rpc.send_raw_transaction(&raw).await?;
        debug!("submitted {} (nonce {}, gas {})", tx_hash, nonce, gas_limit);

        let receipt = self
            .rpc
            .wait_for_receipt(&tx_hash, self.receipt_attempts, self.receipt_interval)
            .await?;
        if !receipt.succeeded() {
            return Err(ChainError::Reverted(tx_hash));
        }
        Ok(receipt)
    }
}

#[async_trait]
impl TaskLedger for TaskContract {
    async fn task(&self, uuid: &TaskUuid) -> Result<OnChainTask, ChainError> {
        let data = encode_call("tasks(uint256)", &[uuid.to_be_bytes()]);
        let out = self.rpc.call(&self.address, &data).await?;
        decode_task_record(&out)
    }

    async fn receipt(&self, tx_hash: &str) -> Result<Option<TransactionReceipt>, ChainError> {
        self.rpc.transaction_receipt(tx_hash).await
    }

    async fn confirm_task(
        &self,
        uuid: &TaskUuid,
        service_agent: &EvmAddress,
        bounty_wei: u128,
    ) -> Result<TransactionReceipt, ChainError> {
        let data = encode_call(
            "confirmTask(uint256,address)",
            &[uuid.to_be_bytes(), address_word(service_agent)],
        );
        let receipt = self.transact(bounty_wei, data).await?;
        info!(
            "confirmTask({}) for {} mined in {}",
            uuid, service_agent, receipt.transaction_hash
        );
        Ok(receipt)
    }

    async fn complete_task(&self, uuid: &TaskUuid) -> Result<TransactionReceipt, ChainError> {
        let data = encode_call("completeTask(uint256)", &[uuid.to_be_bytes()]);
        let receipt = self.transact(0, data).await?;
        info!("completeTask({}) mined in {}", uuid, receipt.transaction_hash);
        Ok(receipt)
    }
}
