use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mxrpc_common::protocol::error::{MxrpcError, Result};
use mxrpc_common::protocol::{procedures, MatrixRequest, MatrixResponse, Request, Response};
use mxrpc_common::transport::{TlsConfig, TlsServer};
use tracing::{debug, info};

use crate::executor::OperationExecutor;

/// Worker settings.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_addr: String,
    /// Identifier reported in every [`MatrixResponse`]. Defaults to the
    /// port the worker is bound to.
    pub worker_id: Option<String>,
    /// Artificial delay before each job, for simulating slow workers.
    pub processing_delay: Duration,
    pub tls: TlsConfig,
}

impl NodeConfig {
    pub fn new(bind_addr: impl Into<String>, tls: TlsConfig) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            worker_id: None,
            processing_delay: Duration::ZERO,
            tls,
        }
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn with_processing_delay(mut self, delay: Duration) -> Self {
        self.processing_delay = delay;
        self
    }
}

/// MxRPC worker node - executes matrix jobs.
///
/// Holds no mutable state; concurrent jobs each run on tokio's blocking
/// pool.
pub struct Node {
    worker_id: String,
    processing_delay: Duration,
    executor: OperationExecutor,
}

impl Node {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            processing_delay: Duration::ZERO,
            executor: OperationExecutor::new(),
        }
    }

    pub fn with_processing_delay(mut self, delay: Duration) -> Self {
        self.processing_delay = delay;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Handles an incoming RPC request.
    ///
    /// Errors are turned into failed responses by the server loop.
    pub async fn handle_request(&self, request: Request) -> Result<Response> {
        debug!("Handling request for method: {}", request.method);

        match request.method.as_str() {
            procedures::WORKER_EXECUTE => {
                let job: MatrixRequest = serde_json::from_value(request.args)
                    .map_err(|e| MxrpcError::InvalidRequest(format!("Malformed job: {}", e)))?;
                let result = self.execute(job).await?;
                Ok(Response::success(request.id, serde_json::to_value(result)?))
            }
            other => Err(MxrpcError::MethodNotFound(other.to_string())),
        }
    }

    /// Runs one job and tags the result with this worker's id.
    pub async fn execute(&self, job: MatrixRequest) -> Result<MatrixResponse> {
        if !self.processing_delay.is_zero() {
            tokio::time::sleep(self.processing_delay).await;
        }

        let executor = self.executor;
        let operation = job.operation.clone();
        let result = tokio::task::spawn_blocking(move || executor.execute(&job))
            .await
            .map_err(|e| MxrpcError::Internal(format!("Job panicked: {}", e)))??;

        debug!(operation = %operation, worker = %self.worker_id, "job complete");
        Ok(MatrixResponse {
            result,
            worker: self.worker_id.clone(),
        })
    }
}

/// A bound worker, ready to serve.
pub struct WorkerServer {
    server: TlsServer,
    node: Arc<Node>,
}

impl WorkerServer {
    pub async fn bind(config: &NodeConfig) -> Result<Self> {
        let server = TlsServer::bind(&config.bind_addr, &config.tls).await?;
        let worker_id = match &config.worker_id {
            Some(id) => id.clone(),
            None => server.local_addr()?.port().to_string(),
        };
        let node = Node::new(worker_id).with_processing_delay(config.processing_delay);

        Ok(Self {
            server,
            node: Arc::new(node),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.server.local_addr()
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Serves until the listener fails.
    pub async fn run(self) -> Result<()> {
        info!(
            "Worker {} listening on {}",
            self.node.worker_id(),
            self.local_addr()?
        );

        let node = self.node.clone();
        self.server
            .run_with_handler(move |request| {
                let node = node.clone();
                async move { node.handle_request(request).await }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mxrpc_common::protocol::Matrix;
    use serde_json::json;

    #[tokio::test]
    async fn test_node_handles_execute() {
        let node = Node::new("5001");
        let job = MatrixRequest::transpose(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        let request = Request::new(procedures::WORKER_EXECUTE, serde_json::to_value(&job).unwrap());

        let response = node.handle_request(request).await.unwrap();
        let result: MatrixResponse = serde_json::from_value(response.into_result().unwrap()).unwrap();

        assert_eq!(result.worker, "5001");
        assert_eq!(
            result.result,
            Matrix::new(vec![vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]])
        );
    }

    #[tokio::test]
    async fn test_node_returns_error_on_unknown_method() {
        let node = Node::new("5001");
        let result = node.handle_request(Request::new("Worker.nothing", json!({}))).await;
        assert!(matches!(result, Err(MxrpcError::MethodNotFound(_))));
    }

    #[tokio::test]
    async fn test_node_rejects_malformed_job() {
        let node = Node::new("5001");
        let request = Request::new(procedures::WORKER_EXECUTE, json!({"operation": "add"}));
        let result = node.handle_request(request).await;
        assert!(matches!(result, Err(MxrpcError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_node_propagates_input_errors() {
        let node = Node::new("5001");
        let job = MatrixRequest::add(vec![vec![1.0, 2.0]], vec![vec![1.0]]);
        let result = node.execute(job).await;
        assert!(matches!(result, Err(MxrpcError::DimensionMismatch(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_processing_delay() {
        let node = Node::new("w").with_processing_delay(Duration::from_secs(60));
        let start = tokio::time::Instant::now();
        node.execute(MatrixRequest::transpose(vec![vec![1.0]])).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_worker_id_defaults_to_port() {
        let dir = tempfile::tempdir().unwrap();
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.path().join("server.crt");
        let key_path = dir.path().join("server.key");
        std::fs::write(&cert_path, cert.cert.pem()).unwrap();
        std::fs::write(&key_path, cert.key_pair.serialize_pem()).unwrap();

        let config = NodeConfig::new("127.0.0.1:0", TlsConfig::new(cert_path, key_path));
        let server = WorkerServer::bind(&config).await.unwrap();
        let port = server.local_addr().unwrap().port();
        assert_eq!(server.node().worker_id(), port.to_string());

        let named = WorkerServer::bind(&config.clone().with_worker_id("alpha")).await.unwrap();
        assert_eq!(named.node().worker_id(), "alpha");
    }
}
