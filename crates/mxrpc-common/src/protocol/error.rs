use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MxrpcError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Remote call to {endpoint} failed: {message}")]
    RemoteCall { endpoint: String, message: String },

    #[error("No workers available")]
    NoWorkersAvailable,

    #[error("All workers have been down for {waited_ms}ms, no nodes available")]
    AllWorkersDown { waited_ms: u64 },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MxrpcError {
    /// Transient failures the dispatcher absorbs and retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MxrpcError::RemoteCall { .. }
                | MxrpcError::NoWorkersAvailable
                | MxrpcError::Connection(_)
                | MxrpcError::Transport(_)
                | MxrpcError::Io(_)
        )
    }

    /// Errors caused by the job itself. Retrying them cannot help.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            MxrpcError::InvalidOperation(_)
                | MxrpcError::DimensionMismatch(_)
                | MxrpcError::InvalidRequest(_)
        )
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            MxrpcError::InvalidOperation(_) => ErrorCode::InvalidOperation,
            MxrpcError::DimensionMismatch(_) => ErrorCode::DimensionMismatch,
            MxrpcError::InvalidRequest(_) | MxrpcError::JsonSerialization(_) => {
                ErrorCode::InvalidRequest
            }
            MxrpcError::MethodNotFound(_) => ErrorCode::MethodNotFound,
            MxrpcError::AllWorkersDown { .. } => ErrorCode::AllWorkersDown,
            _ => ErrorCode::Internal,
        }
    }

    /// Converts the error into its wire form.
    pub fn to_rpc_error(&self) -> RpcError {
        let message = match self {
            MxrpcError::InvalidOperation(msg)
            | MxrpcError::DimensionMismatch(msg)
            | MxrpcError::InvalidRequest(msg)
            | MxrpcError::MethodNotFound(msg)
            | MxrpcError::Internal(msg) => msg.clone(),
            other => other.to_string(),
        };
        let data = match self {
            MxrpcError::AllWorkersDown { waited_ms } => {
                Some(serde_json::json!({ "waited_ms": waited_ms }))
            }
            _ => None,
        };
        RpcError {
            code: self.code(),
            message,
            data,
        }
    }
}

/// Error class carried across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidOperation,
    DimensionMismatch,
    InvalidRequest,
    MethodNotFound,
    AllWorkersDown,
    Internal,
}

/// Structured error in a failed [`Response`](super::Response).
///
/// `data` mirrors the JSON-RPC error object and holds optional details,
/// such as how long the pool was down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<RpcError> for MxrpcError {
    fn from(err: RpcError) -> Self {
        match err.code {
            ErrorCode::InvalidOperation => MxrpcError::InvalidOperation(err.message),
            ErrorCode::DimensionMismatch => MxrpcError::DimensionMismatch(err.message),
            ErrorCode::InvalidRequest => MxrpcError::InvalidRequest(err.message),
            ErrorCode::MethodNotFound => MxrpcError::MethodNotFound(err.message),
            ErrorCode::AllWorkersDown => MxrpcError::AllWorkersDown {
                waited_ms: err
                    .data
                    .as_ref()
                    .and_then(|d| d.get("waited_ms"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0),
            },
            ErrorCode::Internal => MxrpcError::Internal(err.message),
        }
    }
}

impl From<rustls::Error> for MxrpcError {
    fn from(err: rustls::Error) -> Self {
        MxrpcError::Connection(err.to_string())
    }
}

impl From<rustls::pki_types::pem::Error> for MxrpcError {
    fn from(err: rustls::pki_types::pem::Error) -> Self {
        MxrpcError::Certificate(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MxrpcError>;
