use std::net::SocketAddr;
use std::sync::Arc;

use mxrpc_common::protocol::error::{MxrpcError, Result};
use mxrpc_common::protocol::{procedures, MatrixRequest, Request, Response};
use mxrpc_common::transport::{TlsConfig, TlsServer};
use tracing::{debug, info};

use crate::dispatcher::Dispatcher;

/// Serves `Dispatch.process` and `Dispatch.status` for one shared
/// [`Dispatcher`].
pub struct DispatcherServer {
    server: TlsServer,
    dispatcher: Arc<Dispatcher>,
}

impl DispatcherServer {
    pub async fn bind(bind_addr: &str, tls: &TlsConfig, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let server = TlsServer::bind(bind_addr, tls).await?;
        Ok(Self { server, dispatcher })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.server.local_addr()
    }

    /// Serves until the listener fails.
    pub async fn run(self) -> Result<()> {
        info!("Dispatcher listening on {}", self.local_addr()?);

        let dispatcher = self.dispatcher.clone();
        self.server
            .run_with_handler(move |request| {
                let dispatcher = dispatcher.clone();
                async move { handle_request(&dispatcher, request).await }
            })
            .await
    }
}

/// Routes one client request.
pub async fn handle_request(dispatcher: &Dispatcher, request: Request) -> Result<Response> {
    debug!("Handling request for method: {}", request.method);

    match request.method.as_str() {
        procedures::DISPATCH_PROCESS => {
            let job: MatrixRequest = serde_json::from_value(request.args)
                .map_err(|e| MxrpcError::InvalidRequest(format!("Malformed job: {}", e)))?;
            let result = dispatcher.process(job).await?;
            Ok(Response::success(request.id, serde_json::to_value(result)?))
        }
        procedures::DISPATCH_STATUS => {
            Ok(Response::success(request.id, serde_json::to_value(dispatcher.status())?))
        }
        other => Err(MxrpcError::MethodNotFound(other.to_string())),
    }
}
