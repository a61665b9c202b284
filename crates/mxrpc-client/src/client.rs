use std::sync::Arc;

use mxrpc_common::protocol::error::Result;
use mxrpc_common::protocol::{procedures, DispatchStatus, MatrixRequest, MatrixResponse};
use mxrpc_common::transport::{Session, TlsConfig, TlsConnector};
use serde_json::Value;
use tracing::debug;

/// MxRPC client for submitting jobs to a dispatcher
///
/// Opens a fresh TLS connection for each call, so one client can be cloned
/// and used from many tasks at once.
///
/// # Example
///
/// ```no_run
/// use mxrpc_client::MxrpcClient;
/// use mxrpc_common::MatrixRequest;
/// use mxrpc_common::transport::TlsConfig;
/// # async fn run() -> mxrpc_common::Result<()> {
/// let client = MxrpcClient::new("127.0.0.1:5000", TlsConfig::new("server.crt", "server.key"))?;
/// let response = client.submit(MatrixRequest::transpose(vec![vec![1.0, 2.0]])).await?;
/// println!("worker {} returned {}", response.worker, response.result);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MxrpcClient {
    dispatcher_addr: String,
    connector: Arc<TlsConnector>,
}

impl MxrpcClient {
    /// Creates a client for the dispatcher at `dispatcher_addr`.
    ///
    /// Loads the TLS material up front; nothing is dialled until the first
    /// call.
    pub fn new(dispatcher_addr: impl Into<String>, tls: TlsConfig) -> Result<Self> {
        Ok(Self {
            dispatcher_addr: dispatcher_addr.into(),
            connector: Arc::new(TlsConnector::new(tls)?),
        })
    }

    pub fn dispatcher_addr(&self) -> &str {
        &self.dispatcher_addr
    }

    /// Calls a dispatcher procedure and returns its raw result.
    pub async fn call(&self, method: &str, args: Value) -> Result<Value> {
        let session = self.connector.connect_tls(&self.dispatcher_addr).await?;
        debug!("Calling {} on {}", method, self.dispatcher_addr);

        let response = session.invoke(method, args).await?;
        response.into_result()
    }

    /// Runs one matrix job.
    ///
    /// Blocks until some worker has computed it, or until the dispatcher
    /// gives up with `AllWorkersDown`.
    pub async fn submit(&self, request: MatrixRequest) -> Result<MatrixResponse> {
        let result = self
            .call(procedures::DISPATCH_PROCESS, serde_json::to_value(&request)?)
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Fetches the dispatcher's view of its worker pool.
    pub async fn status(&self) -> Result<DispatchStatus> {
        let result = self
            .call(procedures::DISPATCH_STATUS, serde_json::json!({}))
            .await?;
        Ok(serde_json::from_value(result)?)
    }
}
