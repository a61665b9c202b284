use std::time::Duration;

use mxrpc_common::protocol::error::{MxrpcError, Result};
use mxrpc_common::protocol::{procedures, DispatchStatus, MatrixRequest, MatrixResponse, RpcArgs};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::registry::WorkerRegistry;

/// Timing of the retry loop.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Wait between attempts after a failed call or while the pool is empty.
    ///
    /// Default: 2s
    pub backoff: Duration,
    /// How long the pool may stay empty before requests fail with
    /// `AllWorkersDown`.
    ///
    /// Default: 60s
    pub all_down_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(2),
            all_down_timeout: Duration::from_secs(60),
        }
    }
}

/// Where one request is in its retry loop.
enum DispatchState {
    /// Pick a worker and call it.
    Dispatching,
    /// No worker is connected; wait for one.
    AwaitingWorkers,
    /// The pool has been empty for longer than the timeout.
    AllDown { waited: Duration },
    Succeeded(MatrixResponse),
    Failed(MxrpcError),
}

/// MxRPC Dispatcher - routes matrix jobs to the least-busy worker.
///
/// A call that fails at the transport level evicts its worker, triggers one
/// reconnect attempt, and the job is tried again after the backoff on
/// whichever worker is then least busy. Retries are unbounded while any
/// worker is connected. Once the pool is empty, requests keep waiting and
/// reconnecting until it has been empty for `all_down_timeout`.
///
/// Errors returned by a worker that did answer (bad operation, mismatched
/// shapes) go straight back to the caller and leave the worker in the pool.
pub struct Dispatcher {
    registry: WorkerRegistry,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(registry: WorkerRegistry, config: DispatchConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Dials every configured worker once. Returns how many connected.
    pub async fn connect_all(&self) -> usize {
        let connected = self.registry.reconnect_all().await;
        info!(
            "Connected to {}/{} workers",
            connected,
            self.registry.configured().len()
        );
        connected
    }

    /// Runs one job to completion.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` / `DimensionMismatch` / other errors raised by
    ///   the worker that ran the job
    /// - `AllWorkersDown` once the pool has been empty for the timeout
    pub async fn process(&self, request: MatrixRequest) -> Result<MatrixResponse> {
        let args = serde_json::to_value(&request)?;
        let mut state = DispatchState::Dispatching;

        loop {
            state = match state {
                DispatchState::Dispatching => self.dispatch(&args).await,
                DispatchState::AwaitingWorkers => self.await_workers().await,
                DispatchState::AllDown { waited } => {
                    warn!("All workers down for {:?}, failing request", waited);
                    return Err(MxrpcError::AllWorkersDown {
                        waited_ms: waited.as_millis() as u64,
                    });
                }
                DispatchState::Succeeded(response) => return Ok(response),
                DispatchState::Failed(err) => return Err(err),
            };
        }
    }

    async fn dispatch(&self, args: &RpcArgs) -> DispatchState {
        match self.attempt(args).await {
            Ok(result) => DispatchState::Succeeded(result),
            Err(MxrpcError::NoWorkersAvailable) => DispatchState::AwaitingWorkers,
            Err(MxrpcError::RemoteCall { endpoint, message }) => {
                warn!("Call to {} failed: {}, evicting worker", endpoint, message);
                self.recover(&endpoint).await;
                DispatchState::Dispatching
            }
            Err(err) => {
                if err.is_input_error() {
                    debug!("Job rejected: {}", err);
                } else {
                    warn!("Job failed: {}", err);
                }
                DispatchState::Failed(err)
            }
        }
    }

    /// One call to the least-busy worker.
    ///
    /// Transport failures come back as `RemoteCall`; errors raised by a
    /// worker that answered are returned as-is.
    async fn attempt(&self, args: &RpcArgs) -> Result<MatrixResponse> {
        let job = self.registry.acquire().ok_or(MxrpcError::NoWorkersAvailable)?;
        let endpoint = job.endpoint().to_string();
        debug!("Dispatching job to {}", endpoint);

        let outcome = job.session().invoke(procedures::WORKER_EXECUTE, args.clone()).await;
        drop(job);

        let response = outcome.map_err(|e| {
            if e.is_retryable() {
                MxrpcError::RemoteCall {
                    endpoint: endpoint.clone(),
                    message: e.to_string(),
                }
            } else {
                e
            }
        })?;

        let value = response.into_result()?;
        serde_json::from_value(value).map_err(|e| {
            MxrpcError::InvalidResponse(format!("Malformed result from {}: {}", endpoint, e))
        })
    }

    /// Evicts a worker whose call failed and tries it once more.
    async fn recover(&self, endpoint: &str) {
        self.registry.evict(endpoint);

        if let Err(e) = self.registry.connect(endpoint).await {
            warn!("Reconnect to {} failed: {}", endpoint, e);
        }
        tokio::time::sleep(self.config.backoff).await;
    }

    async fn await_workers(&self) -> DispatchState {
        let now = Instant::now();
        if let Some(since) = self.registry.mark_down_if_empty(now) {
            let waited = now.duration_since(since);
            if waited >= self.config.all_down_timeout {
                // final sweep; only a successful connect clears the clock
                if self.registry.reconnect_all().await > 0 {
                    return DispatchState::Dispatching;
                }
                return DispatchState::AllDown { waited };
            }

            debug!("No workers available for {:?}, retrying in {:?}", waited, self.config.backoff);
            tokio::time::sleep(self.config.backoff).await;
            self.registry.reconnect_all().await;
        }

        DispatchState::Dispatching
    }

    pub fn status(&self) -> DispatchStatus {
        DispatchStatus {
            workers: self.registry.workers(),
            configured: self.registry.configured().to_vec(),
            all_down: self.registry.all_down_since().is_some(),
        }
    }
}
