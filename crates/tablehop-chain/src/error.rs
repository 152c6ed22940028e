use thiserror::Error;

/// Errors from key handling, signing and node access
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid private key")]
    InvalidKey,

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("signature recovery failed: {0}")]
    Recovery(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("session id cannot be mapped to a task uuid: {0}")]
    InvalidSessionId(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed rpc response: {0}")]
    Decode(String),

    #[error("abi decode error: {0}")]
    Abi(String),

    #[error("no signing key configured")]
    NoSigner,

    #[error("transaction {0} reverted")]
    Reverted(String),

    #[error("timed out waiting for receipt of {0}")]
    ReceiptTimeout(String),
}

impl ChainError {
    /// Whether the error comes from node infrastructure rather than from the
    /// data being checked
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Rpc { .. } | Self::Decode(_) | Self::ReceiptTimeout(_)
        )
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
