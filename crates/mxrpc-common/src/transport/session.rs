use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::protocol::error::{MxrpcError, Result};
use crate::protocol::{Request, RequestId, Response, RpcArgs};
use crate::transport::codec::{read_frame, write_frame, JsonCodec};
use crate::transport::tls::TlsConfig;

/// Default timeout for establishing the TCP connection (5 seconds)
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A channel to one remote endpoint.
///
/// `invoke` fails only when the transport does: an error raised by the
/// remote procedure itself comes back as an unsuccessful [`Response`].
#[async_trait]
pub trait Session: Send + Sync {
    async fn invoke(&self, procedure: &str, args: RpcArgs) -> Result<Response>;
}

/// Dials endpoints and hands back sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Session>>;
}

type PendingMap = HashMap<RequestId, oneshot::Sender<Response>>;

/// In-flight calls by request id. `None` once the stream has failed.
type Pending = Arc<Mutex<Option<PendingMap>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A [`Session`] over one framed stream, shared by any number of concurrent
/// callers.
///
/// Requests are written under a writer lock; a background task reads
/// response frames and hands each one to the caller waiting on its id. Once
/// the stream fails, every pending and later `invoke` returns a
/// `Transport` error.
pub struct TlsSession {
    endpoint: String,
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: Pending,
    reader: JoinHandle<()>,
}

impl TlsSession {
    /// Wraps an established stream and starts its reader task.
    pub fn new<S>(endpoint: impl Into<String>, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let endpoint = endpoint.into();
        let (read_half, write_half) = tokio::io::split(stream);
        let pending: Pending = Arc::new(Mutex::new(Some(HashMap::new())));

        let reader = tokio::spawn(read_loop(endpoint.clone(), read_half, pending.clone()));

        Self {
            endpoint,
            writer: tokio::sync::Mutex::new(Box::new(write_half)),
            pending,
            reader,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.pending).is_none()
    }

    fn closed_error(&self) -> MxrpcError {
        MxrpcError::Transport(format!("Session to {} is closed", self.endpoint))
    }
}

#[async_trait]
impl Session for TlsSession {
    async fn invoke(&self, procedure: &str, args: RpcArgs) -> Result<Response> {
        let request = Request::new(procedure, args);
        let encoded = JsonCodec::encode_request(&request)?;

        let (tx, rx) = oneshot::channel();
        match lock(&self.pending).as_mut() {
            Some(pending) => {
                pending.insert(request.id, tx);
            }
            None => return Err(self.closed_error()),
        }

        let written = {
            let mut writer = self.writer.lock().await;
            write_frame(&mut *writer, &encoded).await
        };
        if let Err(e) = written {
            // a partial frame leaves the stream unusable
            lock(&self.pending).take();
            return Err(MxrpcError::Transport(format!(
                "Failed to send {} to {}: {}",
                procedure, self.endpoint, e
            )));
        }

        debug!(endpoint = %self.endpoint, id = request.id, procedure, "request sent");
        rx.await.map_err(|_| self.closed_error())
    }
}

impl Drop for TlsSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop<R>(endpoint: String, mut reader: R, pending: Pending)
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(endpoint = %endpoint, "connection closed by peer");
                break;
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "read failed");
                break;
            }
        };

        let response = match JsonCodec::decode_response(&frame) {
            Ok(response) => response,
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "undecodable response");
                break;
            }
        };

        let waiter = lock(&pending)
            .as_mut()
            .and_then(|map| map.remove(&response.id));
        match waiter {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => debug!(endpoint = %endpoint, id = response.id, "response for unknown request"),
        }
    }

    // dropping the senders wakes every waiter with an error
    lock(&pending).take();
}

/// [`Connector`] that dials TCP and runs the TLS client handshake.
pub struct TlsConnector {
    config: TlsConfig,
    connector: tokio_rustls::TlsConnector,
    connect_timeout: Duration,
}

impl TlsConnector {
    pub fn new(config: TlsConfig) -> Result<Self> {
        let connector = config.connector()?;
        Ok(Self {
            config,
            connector,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Dials `endpoint` and returns the concrete session.
    pub async fn connect_tls(&self, endpoint: &str) -> Result<TlsSession> {
        let tcp = tokio::time::timeout(self.connect_timeout, TcpStream::connect(endpoint))
            .await
            .map_err(|_| {
                MxrpcError::Connection(format!(
                    "Timed out connecting to {} after {:?}",
                    endpoint, self.connect_timeout
                ))
            })?
            .map_err(|e| MxrpcError::Connection(format!("Failed to connect to {}: {}", endpoint, e)))?;
        let _ = tcp.set_nodelay(true);

        let server_name = self.config.server_name_for(endpoint)?;
        let stream = self
            .connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| {
                MxrpcError::Connection(format!("TLS handshake with {} failed: {}", endpoint, e))
            })?;

        Ok(TlsSession::new(endpoint, stream))
    }
}

#[async_trait]
impl Connector for TlsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Session>> {
        Ok(Arc::new(self.connect_tls(endpoint).await?))
    }
}
