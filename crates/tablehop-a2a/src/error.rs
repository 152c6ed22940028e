//! A2A errors and their JSON-RPC codes

use serde_json::Value;
use thiserror::Error;

use tablehop_chain::VerifyError;

use crate::protocol::JsonRpcError;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const TASK_NOT_FOUND: i32 = -32001;
pub const TASK_NOT_CANCELABLE: i32 = -32002;
pub const PUSH_NOTIFICATION_NOT_SUPPORTED: i32 = -32003;
pub const UNSUPPORTED_OPERATION: i32 = -32004;
pub const INCOMPATIBLE_CONTENT_TYPES: i32 = -32005;

#[derive(Debug, Error)]
pub enum A2aError {
    #[error("Invalid JSON payload")]
    Parse(String),

    #[error("Request payload validation error")]
    InvalidRequest(String),

    #[error("Method not found")]
    MethodNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Task not found")]
    TaskNotFound(String),

    #[error("Task cannot be canceled")]
    TaskNotCancelable(String),

    #[error("Push Notification is not supported")]
    PushNotificationNotSupported,

    #[error("This operation is not supported")]
    UnsupportedOperation,

    #[error("Incompatible content types")]
    IncompatibleContentTypes,

    #[error("Signature verification failed: {0}")]
    Authentication(VerifyError),

    #[error("Blockchain confirmation validation failed: {0}")]
    ChainConfirmation(VerifyError),
}

impl A2aError {
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => PARSE_ERROR,
            Self::InvalidRequest(_) => INVALID_REQUEST,
            Self::MethodNotFound(_) => METHOD_NOT_FOUND,
            Self::InvalidParams(_) => INVALID_PARAMS,
            Self::Internal(_) | Self::Authentication(_) | Self::ChainConfirmation(_) => {
                INTERNAL_ERROR
            }
            Self::TaskNotFound(_) => TASK_NOT_FOUND,
            Self::TaskNotCancelable(_) => TASK_NOT_CANCELABLE,
            Self::PushNotificationNotSupported => PUSH_NOTIFICATION_NOT_SUPPORTED,
            Self::UnsupportedOperation => UNSUPPORTED_OPERATION,
            Self::IncompatibleContentTypes => INCOMPATIBLE_CONTENT_TYPES,
        }
    }

    fn detail(&self) -> Option<Value> {
        match self {
            Self::Parse(d) | Self::InvalidRequest(d) | Self::MethodNotFound(d) => {
                Some(Value::String(d.clone()))
            }
            Self::TaskNotFound(id) | Self::TaskNotCancelable(id) => {
                Some(serde_json::json!({ "id": id }))
            }
            _ => None,
        }
    }

    pub fn to_rpc_error(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.code(),
            message: self.to_string(),
            data: self.detail(),
        }
    }
}
