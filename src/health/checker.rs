//! Health Checker
//!
//! Owns the target registry and the last result per target. A background
//! task re-checks every target on a fixed interval until stopped; callers may
//! also check one or all targets on demand.

use super::reach::check_reachable;
use super::{HealthCallback, HealthChange, HealthConfig, HealthResult, HealthStatus};
use crate::connection::SwapTarget;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Latest results plus the last status reported through the callback
#[derive(Default)]
struct Board {
    results: HashMap<String, HealthResult>,
    reported: HashMap<String, HealthStatus>,
}

struct Inner {
    config: HealthConfig,
    registry: RwLock<BTreeMap<String, SwapTarget>>,
    board: Mutex<Board>,
    callback: RwLock<Option<HealthCallback>>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct HealthChecker {
    inner: Arc<Inner>,
    task: Mutex<Option<Running>>,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry: RwLock::new(BTreeMap::new()),
                board: Mutex::new(Board::default()),
                callback: RwLock::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.inner.config
    }

    /// Add or replace a target; returns its registry key
    pub async fn register(&self, target: SwapTarget) -> String {
        let key = target.key();
        self.inner.registry.write().await.insert(key.clone(), target);
        self.inner
            .board
            .lock()
            .await
            .results
            .entry(key.clone())
            .or_insert_with(|| HealthResult::unknown(&key));
        debug!("Registered health target {}", key);
        key
    }

    pub async fn unregister(&self, key: &str) -> bool {
        let removed = self.inner.registry.write().await.remove(key).is_some();
        if removed {
            let mut board = self.inner.board.lock().await;
            board.results.remove(key);
            board.reported.remove(key);
            debug!("Unregistered health target {}", key);
        }
        removed
    }

    pub async fn targets(&self) -> Vec<SwapTarget> {
        self.inner.registry.read().await.values().cloned().collect()
    }

    pub async fn status(&self, key: &str) -> Option<HealthStatus> {
        self.result(key).await.map(|r| r.status)
    }

    pub async fn result(&self, key: &str) -> Option<HealthResult> {
        self.inner.board.lock().await.results.get(key).cloned()
    }

    pub async fn all_results(&self) -> Vec<HealthResult> {
        let board = self.inner.board.lock().await;
        let mut results: Vec<_> = board.results.values().cloned().collect();
        results.sort_by(|a, b| a.key.cmp(&b.key));
        results
    }

    /// Replace the change callback
    pub async fn set_callback(&self, callback: HealthCallback) {
        *self.inner.callback.write().await = Some(callback);
    }

    /// Check one registered target now
    pub async fn check_one(&self, key: &str) -> Option<HealthResult> {
        let target = self.inner.registry.read().await.get(key).cloned()?;
        Some(self.inner.check(key.to_string(), target).await)
    }

    /// Check every registered target now, concurrently
    pub async fn check_all(&self) -> Vec<HealthResult> {
        self.inner.check_all().await
    }

    /// Start the polling loop; no-op when already running
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(self.inner.clone(), cancel.clone()));
        *task = Some(Running { cancel, handle });
        info!(
            interval_secs = self.inner.config.interval.as_secs(),
            "Health checker started"
        );
    }

    /// Stop the polling loop; returns once the task has exited
    pub async fn stop(&self) {
        let Some(running) = self.task.lock().await.take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            warn!("Health checker task ended abnormally: {}", e);
        }
        info!("Health checker stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }
}

impl Inner {
    async fn check_all(self: &Arc<Self>) -> Vec<HealthResult> {
        let targets: Vec<(String, SwapTarget)> = self
            .registry
            .read()
            .await
            .iter()
            .map(|(k, t)| (k.clone(), t.clone()))
            .collect();

        let mut set = JoinSet::new();
        for (key, target) in targets {
            let inner = self.clone();
            set.spawn(async move { inner.check(key, target).await });
        }

        let mut results = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!("Health check task failed: {}", e),
            }
        }
        results.sort_by(|a, b| a.key.cmp(&b.key));
        results
    }

    async fn check(&self, key: String, target: SwapTarget) -> HealthResult {
        {
            let mut board = self.board.lock().await;
            let entry = board
                .results
                .entry(key.clone())
                .or_insert_with(|| HealthResult::unknown(&key));
            entry.status = HealthStatus::Checking;
        }

        let started = Instant::now();
        let (status, message) = check_reachable(&target, &self.config).await;
        let result = HealthResult {
            key: key.clone(),
            status,
            message,
            latency_ms: Some(started.elapsed().as_millis() as u64),
            checked_at: Some(Utc::now()),
        };

        let mut board = self.board.lock().await;
        // The target may have been unregistered while the check ran
        if !self.registry.read().await.contains_key(&key) {
            board.results.remove(&key);
            return result;
        }
        board.results.insert(key.clone(), result.clone());

        let previous = board.reported.get(&key).copied().unwrap_or(HealthStatus::Unknown);
        if previous != status {
            board.reported.insert(key.clone(), status);
            debug!("Health of {} changed: {:?} -> {:?}", key, previous, status);
            if let Some(callback) = self.callback.read().await.as_ref() {
                callback(&HealthChange {
                    key,
                    previous,
                    current: result.clone(),
                });
            }
        }
        result
    }
}

async fn run(inner: Arc<Inner>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(inner.config.interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    results = inner.check_all() => {
                        debug!(checked = results.len(), "Health poll complete");
                    }
                }
            }
        }
    }
}
