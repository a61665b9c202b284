use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use mxrpc_common::protocol::error::Result;
use mxrpc_common::protocol::WorkerStatus;
use mxrpc_common::transport::{Connector, Session};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::selector::select_least_busy;

/// Worker address, `host:port`.
pub type Endpoint = String;

struct WorkerEntry {
    session: Arc<dyn Session>,
    active_jobs: usize,
    /// Bumped on every successful connect so a guard from a replaced
    /// session cannot touch its successor's count.
    generation: u64,
}

#[derive(Default)]
struct RegistryState {
    /// Connected workers only.
    workers: BTreeMap<Endpoint, WorkerEntry>,
    /// Set while `workers` has been continuously empty since that instant.
    all_down_since: Option<Instant>,
    next_generation: u64,
}

type SharedState = Arc<Mutex<RegistryState>>;

fn lock(state: &Mutex<RegistryState>) -> MutexGuard<'_, RegistryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The dispatcher's view of the worker pool.
///
/// Sessions are dialled through the injected [`Connector`] with no lock
/// held; every read and write of the pool happens under one mutex that is
/// never held across an `.await`.
pub struct WorkerRegistry {
    configured: Vec<Endpoint>,
    connector: Arc<dyn Connector>,
    state: SharedState,
}

impl WorkerRegistry {
    /// Creates an empty registry for the given endpoints. Duplicates are
    /// dropped. Nothing is dialled until [`connect`](Self::connect) or
    /// [`reconnect_all`](Self::reconnect_all).
    pub fn new(endpoints: Vec<Endpoint>, connector: Arc<dyn Connector>) -> Self {
        let mut configured = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            if !configured.contains(&endpoint) {
                configured.push(endpoint);
            }
        }

        Self {
            configured,
            connector,
            state: Arc::new(Mutex::new(RegistryState::default())),
        }
    }

    pub fn configured(&self) -> &[Endpoint] {
        &self.configured
    }

    /// Dials `endpoint` and installs the new session with zero active jobs,
    /// replacing any previous one. Clears the all-down mark.
    ///
    /// # Errors
    ///
    /// The connector's error. The pool is left unchanged.
    pub async fn connect(&self, endpoint: &str) -> Result<()> {
        let session = self.connector.connect(endpoint).await?;

        let mut state = lock(&self.state);
        state.next_generation += 1;
        let generation = state.next_generation;
        state.workers.insert(
            endpoint.to_string(),
            WorkerEntry {
                session,
                active_jobs: 0,
                generation,
            },
        );
        state.all_down_since = None;
        drop(state);

        info!("Connected to worker {}", endpoint);
        Ok(())
    }

    /// Removes `endpoint` from the pool. Returns whether it was present.
    ///
    /// Removing the last worker starts the all-down clock.
    pub fn evict(&self, endpoint: &str) -> bool {
        let mut state = lock(&self.state);
        let removed = state.workers.remove(endpoint).is_some();
        if state.workers.is_empty() && state.all_down_since.is_none() {
            state.all_down_since = Some(Instant::now());
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.state).workers.is_empty()
    }

    pub fn is_live(&self, endpoint: &str) -> bool {
        lock(&self.state).workers.contains_key(endpoint)
    }

    /// Starts the all-down clock at `now` if the pool is empty and the clock
    /// is not already running. Returns the clock's start, if any.
    pub fn mark_down_if_empty(&self, now: Instant) -> Option<Instant> {
        let mut state = lock(&self.state);
        if state.workers.is_empty() && state.all_down_since.is_none() {
            state.all_down_since = Some(now);
        }
        state.all_down_since
    }

    pub fn all_down_since(&self) -> Option<Instant> {
        lock(&self.state).all_down_since
    }

    /// Picks the least-busy worker and counts a job against it in one step.
    ///
    /// The count is released when the returned guard drops.
    pub fn acquire(&self) -> Option<JobGuard> {
        let mut state = lock(&self.state);
        let endpoint = select_least_busy(
            state
                .workers
                .iter()
                .map(|(endpoint, entry)| (endpoint.as_str(), entry.active_jobs)),
        )?
        .to_string();

        let entry = state.workers.get_mut(&endpoint)?;
        entry.active_jobs += 1;

        Some(JobGuard {
            state: self.state.clone(),
            session: entry.session.clone(),
            generation: entry.generation,
            endpoint,
        })
    }

    /// Dials every configured endpoint that is not connected, concurrently.
    /// Returns how many connected.
    pub async fn reconnect_all(&self) -> usize {
        let missing: Vec<Endpoint> = {
            let state = lock(&self.state);
            self.configured
                .iter()
                .filter(|endpoint| !state.workers.contains_key(*endpoint))
                .cloned()
                .collect()
        };

        let attempts = missing.iter().map(|endpoint| async move {
            let result = self.connect(endpoint).await;
            if let Err(e) = &result {
                warn!("Reconnect to {} failed: {}", endpoint, e);
            }
            result.is_ok()
        });

        join_all(attempts).await.into_iter().filter(|ok| *ok).count()
    }

    /// Active job count of a connected worker.
    pub fn active_jobs(&self, endpoint: &str) -> Option<usize> {
        lock(&self.state).workers.get(endpoint).map(|entry| entry.active_jobs)
    }

    /// Connected workers sorted by endpoint.
    pub fn workers(&self) -> Vec<WorkerStatus> {
        lock(&self.state)
            .workers
            .iter()
            .map(|(endpoint, entry)| WorkerStatus {
                endpoint: endpoint.clone(),
                active_jobs: entry.active_jobs,
            })
            .collect()
    }
}

/// One job counted against one worker.
pub struct JobGuard {
    state: SharedState,
    endpoint: Endpoint,
    generation: u64,
    session: Arc<dyn Session>,
}

impl JobGuard {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if let Some(entry) = state.workers.get_mut(&self.endpoint) {
            if entry.generation == self.generation {
                entry.active_jobs = entry.active_jobs.saturating_sub(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockConnector;
    use std::time::Duration;

    fn registry(mock: &MockConnector, endpoints: &[&str]) -> WorkerRegistry {
        WorkerRegistry::new(
            endpoints.iter().map(|e| e.to_string()).collect(),
            Arc::new(mock.clone()),
        )
    }

    #[test]
    fn test_duplicate_endpoints_are_dropped() {
        let mock = MockConnector::new();
        let registry = registry(&mock, &["a:1", "b:1", "a:1"]);
        assert_eq!(registry.configured(), ["a:1".to_string(), "b:1".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_and_evict() {
        let mock = MockConnector::new();
        mock.add_worker("a:1");
        let registry = registry(&mock, &["a:1"]);

        assert!(registry.is_empty());
        registry.connect("a:1").await.unwrap();
        assert!(registry.is_live("a:1"));
        assert_eq!(registry.active_jobs("a:1"), Some(0));

        assert!(registry.evict("a:1"));
        assert!(!registry.evict("a:1"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_pool_unchanged() {
        let mock = MockConnector::new();
        mock.add_worker("a:1");
        mock.set_reachable("b:1", false);
        let registry = registry(&mock, &["a:1", "b:1"]);

        registry.connect("a:1").await.unwrap();
        assert!(registry.connect("b:1").await.is_err());
        assert_eq!(registry.workers().len(), 1);
    }

    #[tokio::test]
    async fn test_acquire_counts_until_guard_drops() {
        let mock = MockConnector::new();
        mock.add_worker("a:1");
        mock.add_worker("b:1");
        let registry = registry(&mock, &["a:1", "b:1"]);
        registry.reconnect_all().await;

        let first = registry.acquire().unwrap();
        let second = registry.acquire().unwrap();
        let third = registry.acquire().unwrap();
        assert_eq!(first.endpoint(), "a:1");
        assert_eq!(second.endpoint(), "b:1");
        assert_eq!(third.endpoint(), "a:1");
        assert_eq!(registry.active_jobs("a:1"), Some(2));

        drop(first);
        drop(third);
        assert_eq!(registry.active_jobs("a:1"), Some(0));
        assert_eq!(registry.active_jobs("b:1"), Some(1));
        drop(second);
        assert_eq!(registry.active_jobs("b:1"), Some(0));
    }

    #[tokio::test]
    async fn test_acquire_on_empty_pool() {
        let registry = registry(&MockConnector::new(), &[]);
        assert!(registry.acquire().is_none());
    }

    #[tokio::test]
    async fn test_stale_guard_does_not_touch_new_session() {
        let mock = MockConnector::new();
        mock.add_worker("a:1");
        let registry = registry(&mock, &["a:1"]);
        registry.connect("a:1").await.unwrap();

        let stale = registry.acquire().unwrap();
        registry.connect("a:1").await.unwrap();
        assert_eq!(registry.active_jobs("a:1"), Some(0));

        let fresh = registry.acquire().unwrap();
        drop(stale);
        assert_eq!(registry.active_jobs("a:1"), Some(1));
        drop(fresh);
        assert_eq!(registry.active_jobs("a:1"), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_down_clock() {
        let mock = MockConnector::new();
        mock.add_worker("a:1");
        let registry = registry(&mock, &["a:1"]);

        let t0 = Instant::now();
        assert_eq!(registry.mark_down_if_empty(t0), Some(t0));

        // a later observation keeps the original start
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(registry.mark_down_if_empty(Instant::now()), Some(t0));

        registry.connect("a:1").await.unwrap();
        assert_eq!(registry.all_down_since(), None);
        assert_eq!(registry.mark_down_if_empty(Instant::now()), None);

        tokio::time::advance(Duration::from_secs(5)).await;
        let t1 = Instant::now();
        registry.evict("a:1");
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(registry.mark_down_if_empty(Instant::now()), Some(t1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicting_last_worker_starts_clock() {
        let mock = MockConnector::new();
        mock.add_worker("a:1");
        mock.add_worker("b:1");
        let registry = registry(&mock, &["a:1", "b:1"]);
        registry.reconnect_all().await;

        registry.evict("a:1");
        assert_eq!(registry.all_down_since(), None);

        let emptied_at = Instant::now();
        registry.evict("b:1");
        assert_eq!(registry.all_down_since(), Some(emptied_at));

        // evicting from an empty pool keeps the original start
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!registry.evict("b:1"));
        assert_eq!(registry.all_down_since(), Some(emptied_at));
    }

    #[tokio::test]
    async fn test_reconnect_all_only_dials_missing() {
        let mock = MockConnector::new();
        mock.add_worker("a:1");
        mock.add_worker("b:1");
        mock.set_reachable("c:1", false);
        let registry = registry(&mock, &["a:1", "b:1", "c:1"]);

        registry.connect("a:1").await.unwrap();
        assert_eq!(registry.reconnect_all().await, 1);
        assert_eq!(mock.connects("a:1"), 1);
        assert_eq!(mock.connects("b:1"), 1);
        assert_eq!(mock.connects("c:1"), 1);

        let endpoints: Vec<_> = registry.workers().into_iter().map(|w| w.endpoint).collect();
        assert_eq!(endpoints, vec!["a:1".to_string(), "b:1".to_string()]);
    }
}
