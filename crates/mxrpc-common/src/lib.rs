//! MxRPC Common Types and Transport
//!
//! This crate provides the protocol definitions, the matrix job data model
//! and the TLS transport shared by the MxRPC dispatcher, workers and client.
//!
//! # Overview
//!
//! MxRPC distributes matrix-arithmetic jobs from clients across a pool of
//! worker nodes through a central dispatcher. Every component speaks the same
//! wire protocol:
//!
//! - **Transport**: TLS 1.2/1.3 over TCP, one multiplexed stream per peer
//! - **Serialization**: JSON
//! - **Message Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **Max Message Size**: 100 MB
//!
//! # Components
//!
//! - [`protocol`] - Request/Response envelopes, errors, matrix payloads
//! - [`transport`] - framing, TLS configuration, sessions and the server loop
//!
//! # Example
//!
//! ```
//! use mxrpc_common::{MatrixRequest, Request, Response};
//! use mxrpc_common::protocol::procedures;
//!
//! let job = MatrixRequest::transpose(vec![vec![1.0, 2.0, 3.0]]);
//! let request = Request::new(procedures::DISPATCH_PROCESS, serde_json::to_value(&job).unwrap());
//!
//! let response = Response::success(request.id, serde_json::json!({"result": [[1.0], [2.0], [3.0]], "worker": "5001"}));
//! assert!(response.success);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
