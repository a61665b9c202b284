//! In-memory workers for registry and dispatcher tests.
//!
//! Each mock worker answers `Worker.execute` with a real [`Node`], so job
//! results and input errors match a deployed worker. Reachability, health
//! and a per-call gate are scripted per endpoint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mxrpc_common::protocol::error::{MxrpcError, Result};
use mxrpc_common::protocol::{Request, Response, RpcArgs};
use mxrpc_common::transport::{Connector, Session};
use mxrpc_worker::Node;
use tokio::sync::Semaphore;

#[derive(Clone)]
struct MockWorker {
    reachable: bool,
    healthy: bool,
    /// When set, every call waits for a permit before answering.
    gate: Option<Arc<Semaphore>>,
    connects: usize,
    calls: usize,
}

impl Default for MockWorker {
    fn default() -> Self {
        Self {
            reachable: true,
            healthy: true,
            gate: None,
            connects: 0,
            calls: 0,
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    workers: Arc<Mutex<HashMap<String, MockWorker>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, endpoint: &str, f: impl FnOnce(&mut MockWorker)) {
        let mut workers = self.workers.lock().unwrap();
        f(workers.entry(endpoint.to_string()).or_default());
    }

    fn read<T>(&self, endpoint: &str, f: impl FnOnce(&MockWorker) -> T) -> T {
        let workers = self.workers.lock().unwrap();
        f(workers.get(endpoint).unwrap_or(&MockWorker::default()))
    }

    pub fn add_worker(&self, endpoint: &str) {
        self.update(endpoint, |_| {});
    }

    pub fn set_reachable(&self, endpoint: &str, reachable: bool) {
        self.update(endpoint, |w| w.reachable = reachable);
    }

    /// An unhealthy worker accepts connections but fails every call.
    pub fn set_healthy(&self, endpoint: &str, healthy: bool) {
        self.update(endpoint, |w| w.healthy = healthy);
    }

    /// Holds calls to `endpoint` until permits are added to the semaphore.
    pub fn gate(&self, endpoint: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        let shared = gate.clone();
        self.update(endpoint, move |w| w.gate = Some(shared));
        gate
    }

    pub fn connects(&self, endpoint: &str) -> usize {
        self.read(endpoint, |w| w.connects)
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.read(endpoint, |w| w.calls)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Session>> {
        let mut reachable = false;
        self.update(endpoint, |w| {
            w.connects += 1;
            reachable = w.reachable;
        });

        if !reachable {
            return Err(MxrpcError::Connection(format!(
                "Failed to connect to {}: connection refused",
                endpoint
            )));
        }

        Ok(Arc::new(MockSession {
            endpoint: endpoint.to_string(),
            workers: self.clone(),
            node: Node::new(endpoint),
        }))
    }
}

struct MockSession {
    endpoint: String,
    workers: MockConnector,
    node: Node,
}

impl MockSession {
    fn check_health(&self) -> Result<()> {
        if self.workers.read(&self.endpoint, |w| w.healthy) {
            Ok(())
        } else {
            Err(MxrpcError::Transport(format!(
                "Connection to {} reset",
                self.endpoint
            )))
        }
    }
}

#[async_trait]
impl Session for MockSession {
    async fn invoke(&self, procedure: &str, args: RpcArgs) -> Result<Response> {
        let mut gate = None;
        self.workers.update(&self.endpoint, |w| {
            w.calls += 1;
            gate = w.gate.clone();
        });
        self.check_health()?;

        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
            self.check_health()?;
        }

        let request = Request::new(procedure, args);
        let id = request.id;
        Ok(match self.node.handle_request(request).await {
            Ok(response) => response,
            Err(e) => Response::from_error(id, &e),
        })
    }
}
