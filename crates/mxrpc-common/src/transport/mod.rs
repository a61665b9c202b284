//! MxRPC Transport Layer
//!
//! Length-prefixed JSON envelopes over TLS 1.2/1.3 (rustls + tokio-rustls).
//!
//! # Wire Format
//!
//! ```text
//! [4-byte length as u32 big-endian] [JSON Request or Response]
//! ```
//!
//! Frames above 100 MB are rejected on read and write.
//!
//! # Components
//!
//! - **[`JsonCodec`]**, [`read_frame`], [`write_frame`]: envelope codec and framing
//! - **[`TlsConfig`]**: certificate, key and optional CA paths
//! - **[`Session`]** / **[`Connector`]**: the seam the dispatcher and client call through
//! - **[`TlsSession`]** / **[`TlsConnector`]**: multiplexed TLS implementation of that seam
//! - **[`TlsServer`]**: accept loop used by the dispatcher and the workers
//!
//! # Example
//!
//! ```no_run
//! use mxrpc_common::transport::{Connector, Session, TlsConfig, TlsConnector};
//! use serde_json::json;
//!
//! # async fn run() -> mxrpc_common::Result<()> {
//! let connector = TlsConnector::new(TlsConfig::new("server.crt", "server.key"))?;
//! let session = connector.connect("127.0.0.1:5000").await?;
//! let response = session.invoke("Dispatch.status", json!({})).await?;
//! println!("{:?}", response.into_result()?);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod server;
pub mod session;
pub mod tls;

pub use codec::{read_frame, write_frame, JsonCodec, MAX_MESSAGE_SIZE};
pub use server::TlsServer;
pub use session::{Connector, Session, TlsConnector, TlsSession};
pub use tls::TlsConfig;
