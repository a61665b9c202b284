//! MxRPC Response Types
//!
//! This module defines the RPC response structure.

use serde::{Deserialize, Serialize};
use super::error::{MxrpcError, Result, RpcError};
use super::RequestId;

/// RPC procedure result (JSON value)
pub type RpcResult = serde_json::Value;

/// An RPC response returned by a worker or the dispatcher.
///
/// # Fields
///
/// - `id`: The request ID this response corresponds to
/// - `result`: The result value (present on success)
/// - `error`: Structured error (present on failure)
/// - `success`: Whether the request succeeded
///
/// # Example
///
/// ```
/// use mxrpc_common::protocol::{ErrorCode, Response, RpcError};
/// use serde_json::json;
///
/// let ok = Response::success(123, json!([[1.0, 2.0]]));
/// assert!(ok.success);
///
/// let failed = Response::error(123, RpcError::new(ErrorCode::InvalidOperation, "subtract"));
/// assert!(!failed.success);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub result: Option<RpcResult>,
    pub error: Option<RpcError>,
    pub success: bool,
}

impl Response {
    pub fn success(id: RequestId, result: RpcResult) -> Self {
        Response {
            id,
            result: Some(result),
            error: None,
            success: true,
        }
    }

    pub fn error(id: RequestId, error: RpcError) -> Self {
        Response {
            id,
            result: None,
            error: Some(error),
            success: false,
        }
    }

    /// Builds a failed response from a local error.
    pub fn from_error(id: RequestId, error: &MxrpcError) -> Self {
        Self::error(id, error.to_rpc_error())
    }

    /// Unwraps the result, rebuilding the remote error on failure.
    ///
    /// # Errors
    ///
    /// - The remote error, mapped back onto its [`MxrpcError`] variant
    /// - `InvalidResponse` if a successful response carries no result
    pub fn into_result(self) -> Result<RpcResult> {
        if self.success {
            self.result.ok_or_else(|| {
                MxrpcError::InvalidResponse("Missing result in success response".to_string())
            })
        } else {
            Err(self
                .error
                .map(MxrpcError::from)
                .unwrap_or_else(|| MxrpcError::InvalidResponse("Missing error in failed response".to_string())))
        }
    }
}
