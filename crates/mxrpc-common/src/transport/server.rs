use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::protocol::error::{MxrpcError, Result};
use crate::protocol::{Request, Response};
use crate::transport::codec::{read_frame, write_frame, JsonCodec};
use crate::transport::tls::TlsConfig;

/// Async TLS server shared by the dispatcher and the workers.
///
/// Each accepted connection runs in its own task, and each request frame on
/// a connection is handled by a further task, so one slow request never
/// blocks the others on the same connection. Responses carry the request id
/// and may be written out of order.
pub struct TlsServer {
    listener: TcpListener,
    acceptor: TlsAcceptor,
}

impl TlsServer {
    /// Binds `bind_addr` and loads the server's TLS material.
    pub async fn bind(bind_addr: &str, tls: &TlsConfig) -> Result<Self> {
        let acceptor = tls.acceptor()?;
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| MxrpcError::Connection(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self { listener, acceptor })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| MxrpcError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Runs the accept loop with the given request handler.
    ///
    /// A handler error is sent back to the caller as a failed [`Response`].
    /// Only a failing listener ends the loop.
    pub async fn run_with_handler<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let (tcp, peer_addr) = self
                .listener
                .accept()
                .await
                .map_err(|e| MxrpcError::Connection(format!("Failed to accept connection: {}", e)))?;

            let acceptor = self.acceptor.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                let stream = match acceptor.accept(tcp).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(peer = %peer_addr, error = %e, "TLS handshake failed");
                        return;
                    }
                };
                info!(peer = %peer_addr, "connection established");

                if let Err(e) = handle_connection(stream, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection error");
                }
            });
        }
    }
}

/// Serves request frames from one connection until the peer closes it.
async fn handle_connection<S, F, Fut>(stream: S, handler: Arc<F>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);
    let writer = Arc::new(Mutex::new(writer));

    loop {
        let frame = match read_frame(&mut reader).await? {
            Some(frame) => frame,
            None => {
                debug!("connection closed by peer");
                return Ok(());
            }
        };

        let request = match JsonCodec::decode_request(&frame) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "failed to decode request");
                let invalid = MxrpcError::InvalidRequest(e.to_string());
                send_response(&writer, &Response::from_error(0, &invalid)).await?;
                continue;
            }
        };

        let handler = handler.clone();
        let writer = writer.clone();
        tokio::spawn(async move {
            let request_id = request.id;
            let response = match handler(request).await {
                Ok(response) => response,
                Err(e) => {
                    debug!(id = request_id, error = %e, "handler error");
                    Response::from_error(request_id, &e)
                }
            };

            if let Err(e) = send_response(&writer, &response).await {
                warn!(id = request_id, error = %e, "failed to send response");
            }
        });
    }
}

async fn send_response<S>(writer: &Mutex<WriteHalf<S>>, response: &Response) -> Result<()>
where
    S: AsyncWrite,
{
    let encoded = JsonCodec::encode_response(response)?;
    let mut writer = writer.lock().await;
    write_frame(&mut *writer, &encoded).await
}
