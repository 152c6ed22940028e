//! Request verification: host signatures and on-chain task confirmation
//!
//! A host signs `address ‖ session_id`. A task anchored on chain carries the
//! hash of its `confirmTask` transaction; the service agent checks the
//! contract record names it as the service agent and that the transaction
//! succeeded. Node outages let the task through unless strict mode is on.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::address::EvmAddress;
use crate::contract::{TaskLedger, TaskUuid};
use crate::error::ChainError;
use crate::signer::{personal_message_hash, recover_address};

/// `auth` metadata attached by the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthAssertion {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("No authentication data found in message metadata")]
    MissingAuth,

    #[error("Missing Ethereum address in auth data")]
    MissingAddress,

    #[error("Missing signature in auth data")]
    MissingSignature,

    #[error("Error recovering address from signature: {0}")]
    Recovery(ChainError),

    #[error("Signature verification failed. Expected {expected}, got {recovered}")]
    SignerMismatch { expected: String, recovered: String },

    #[error("Missing blockchain transaction hash")]
    MissingTxHash,

    #[error("Invalid session id: {0}")]
    SessionId(ChainError),

    #[error("Task service agent address mismatch. Expected: {expected}, Got: {actual}")]
    ServiceAgentMismatch { expected: String, actual: String },

    #[error("Unable to get transaction receipt")]
    MissingReceipt,

    #[error("Transaction execution failed")]
    TransactionFailed,

    #[error("Blockchain unavailable: {0}")]
    Unavailable(String),
}

/// Check a host's signature over `address ‖ session_id`.
///
/// Returns the recovered signer on success.
pub fn verify_auth(auth: Option<&AuthAssertion>, session_id: &str) -> Result<EvmAddress, VerifyError> {
    let auth = auth.ok_or(VerifyError::MissingAuth)?;
    let address = auth
        .address
        .as_deref()
        .filter(|a| !a.is_empty())
        .ok_or(VerifyError::MissingAddress)?;
    let signature = auth
        .signature
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(VerifyError::MissingSignature)?;

    let message = format!("{}{}", address, session_id);
    let recovered = recover_address(&personal_message_hash(message.as_bytes()), signature)
        .map_err(VerifyError::Recovery)?;

    if !recovered.matches(address) {
        return Err(VerifyError::SignerMismatch {
            expected: address.to_string(),
            recovered: recovered.to_checksum(),
        });
    }

    info!("Signature verified for host agent {}", address);
    Ok(recovered)
}

/// Outcome of a chain check that did not reject the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerdict {
    /// Record and receipt checked out
    Confirmed(TaskUuid),
    /// Check not performed, or not conclusive; the task may proceed
    Skipped(String),
}

impl ChainVerdict {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }
}

/// Verifies `confirmTask` anchoring for incoming tasks
pub struct ChainVerifier {
    ledger: Option<Arc<dyn TaskLedger>>,
    agent_address: Option<EvmAddress>,
    strict: bool,
}

impl ChainVerifier {
    pub fn new(
        ledger: Option<Arc<dyn TaskLedger>>,
        agent_address: Option<EvmAddress>,
        strict: bool,
    ) -> Self {
        Self {
            ledger,
            agent_address,
            strict,
        }
    }

    /// Turn an infrastructure failure into a pass, or an error in strict mode
    fn lenient(&self, reason: String) -> Result<ChainVerdict, VerifyError> {
        if self.strict {
            warn!("Blockchain check failed in strict mode: {}", reason);
            Err(VerifyError::Unavailable(reason))
        } else {
            warn!("{}, allowing task to proceed", reason);
            Ok(ChainVerdict::Skipped(reason))
        }
    }

    /// Check the task anchored for `session_id`.
    ///
    /// `tx_hash` is `None` when the request carried `blockchain` metadata
    /// without a `confirmTask.tx_hash`.
    pub async fn verify(
        &self,
        session_id: &str,
        tx_hash: Option<&str>,
    ) -> Result<ChainVerdict, VerifyError> {
        let tx_hash = tx_hash.filter(|h| !h.is_empty()).ok_or(VerifyError::MissingTxHash)?;
        let uuid = TaskUuid::from_session_id(session_id).map_err(VerifyError::SessionId)?;

        let Some(ledger) = self.ledger.as_ref() else {
            return self.lenient("No blockchain node configured".to_string());
        };
        let Some(agent_address) = self.agent_address else {
            warn!("Agent ethereum address not set, skipping blockchain task validation");
            return Ok(ChainVerdict::Skipped(
                "Blockchain validation skipped due to missing agent address".to_string(),
            ));
        };

        let record = match ledger.task(&uuid).await {
            Ok(record) => record,
            Err(e) => return self.lenient(format!("Blockchain task lookup failed: {}", e)),
        };

        if record.service_agent.is_zero() {
            warn!("On-chain task uuid {} does not exist or is not properly set", uuid);
            return Ok(ChainVerdict::Skipped(
                "Blockchain task not found, but allowing task to proceed".to_string(),
            ));
        }
        if record.service_agent != agent_address {
            return Err(VerifyError::ServiceAgentMismatch {
                expected: agent_address.to_checksum(),
                actual: record.service_agent.to_checksum(),
            });
        }

        let receipt = match ledger.receipt(tx_hash).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => return Err(VerifyError::MissingReceipt),
            Err(e) => return self.lenient(format!("Receipt lookup failed: {}", e)),
        };
        if !receipt.succeeded() {
            return Err(VerifyError::TransactionFailed);
        }

        info!("On-chain task check confirmed, uuid {}", uuid);
        Ok(ChainVerdict::Confirmed(uuid))
    }
}
