//! Payload of `Dispatch.status`.

use serde::{Deserialize, Serialize};

/// One live worker and the jobs currently in flight on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub endpoint: String,
    pub active_jobs: usize,
}

/// Snapshot of a dispatcher's worker pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStatus {
    /// Connected workers, sorted by endpoint.
    pub workers: Vec<WorkerStatus>,
    /// Every endpoint the dispatcher was started with.
    pub configured: Vec<String>,
    /// Whether the pool has been observed empty and not recovered since.
    pub all_down: bool,
}
