//! Index worker: drains the task store and reconciles the search index with the
//! primary store, one record at a time, with retry and dead-lettering.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use campus_core::{Entity, EntityId};

use super::store::{IndexQueueError, IndexTaskStore, TaskStats};
use super::types::{IndexOp, IndexTask, RecordKey, RetryPolicy, TaskId, TaskStatus};
use crate::repository::{EntityRepository, RepositoryError};
use crate::search::{SearchError, SearchRepository};

/// What a sync did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Indexed,
    Removed,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("reading primary store: {0}")]
    Repository(#[from] RepositoryError),
    #[error("writing search index: {0}")]
    Search(#[from] SearchError),
}

/// Brings the search index in line with the primary store for one record.
#[async_trait]
pub trait IndexSink: Send + Sync {
    async fn sync(&self, id: EntityId) -> Result<SyncOutcome, SyncError>;
}

/// Sink for one record type: index the stored record, or drop it from the index
/// when the primary store no longer has it.
pub struct RecordSync<E: Entity> {
    repository: Arc<dyn EntityRepository<E>>,
    search: Arc<dyn SearchRepository<E>>,
}

impl<E: Entity> RecordSync<E> {
    pub fn new(repository: Arc<dyn EntityRepository<E>>, search: Arc<dyn SearchRepository<E>>) -> Self {
        Self { repository, search }
    }
}

#[async_trait]
impl<E: Entity> IndexSink for RecordSync<E> {
    async fn sync(&self, id: EntityId) -> Result<SyncOutcome, SyncError> {
        match self.repository.find_by_id(id).await? {
            Some(record) => {
                self.search.index(&record).await?;
                Ok(SyncOutcome::Indexed)
            }
            None => {
                self.search.delete(id).await?;
                Ok(SyncOutcome::Removed)
            }
        }
    }
}

/// Producer side of the index queue, shared by every record service.
#[derive(Clone)]
pub struct IndexQueue {
    store: Arc<dyn IndexTaskStore>,
    policy: RetryPolicy,
    wake: Arc<Notify>,
}

impl IndexQueue {
    pub fn new(store: Arc<dyn IndexTaskStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Record the obligation to sync `(entity, id)` into the index.
    pub fn enqueue(&self, entity: &str, id: EntityId, op: IndexOp) -> Result<TaskId, IndexQueueError> {
        let task = IndexTask::new(RecordKey::new(entity, id), op).with_retry_policy(self.policy.clone());
        let task_id = self.store.enqueue(task)?;
        debug!(entity, %id, ?op, task_id = %task_id, "index task enqueued");
        self.wake.notify_one();
        Ok(task_id)
    }

    pub fn retry_dead_letter(&self, task_id: TaskId) -> Result<TaskId, IndexQueueError> {
        let queued = self.store.retry_dead_letter(task_id)?;
        info!(task_id = %task_id, queued_as = %queued, "dead-lettered index task requeued");
        self.wake.notify_one();
        Ok(queued)
    }

    pub fn store(&self) -> &Arc<dyn IndexTaskStore> {
        &self.store
    }

    pub fn stats(&self) -> Result<TaskStats, IndexQueueError> {
        self.store.stats()
    }
}

#[derive(Debug, Clone)]
pub struct IndexWorkerConfig {
    /// Fallback poll when no enqueue wakes the worker (retries coming due)
    pub poll_interval: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for IndexWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            name: "index-worker".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerStats {
    pub tasks_processed: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_dead_lettered: u64,
    pub uptime_secs: u64,
}

/// Shared view of a worker's counters.
#[derive(Debug, Clone, Default)]
pub struct WorkerStatsHandle(Arc<Mutex<WorkerStats>>);

impl WorkerStatsHandle {
    pub fn snapshot(&self) -> WorkerStats {
        self.0.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn update(&self, f: impl FnOnce(&mut WorkerStats)) {
        if let Ok(mut stats) = self.0.lock() {
            f(&mut stats);
        }
    }
}

/// Background index worker.
pub struct IndexWorker {
    store: Arc<dyn IndexTaskStore>,
    sinks: HashMap<String, Arc<dyn IndexSink>>,
    wake: Arc<Notify>,
    stats: WorkerStatsHandle,
    config: IndexWorkerConfig,
}

impl IndexWorker {
    pub fn new(queue: &IndexQueue, config: IndexWorkerConfig) -> Self {
        Self {
            store: queue.store.clone(),
            sinks: HashMap::new(),
            wake: queue.wake.clone(),
            stats: WorkerStatsHandle::default(),
            config,
        }
    }

    /// Sync records of type `E` from `repository` into `search`.
    pub fn register<E: Entity>(
        &mut self,
        repository: Arc<dyn EntityRepository<E>>,
        search: Arc<dyn SearchRepository<E>>,
    ) {
        self.register_sink(E::NAME, Arc::new(RecordSync::new(repository, search)));
    }

    pub fn register_sink(&mut self, entity: impl Into<String>, sink: Arc<dyn IndexSink>) {
        self.sinks.insert(entity.into(), sink);
    }

    pub fn stats(&self) -> WorkerStatsHandle {
        self.stats.clone()
    }

    /// Claim and execute one ready task. Returns the task in its final state for
    /// this attempt, or `None` when nothing is ready.
    pub async fn run_once(&self) -> Result<Option<IndexTask>, IndexQueueError> {
        let Some(mut task) = self.store.claim_next()? else {
            return Ok(None);
        };
        debug!(worker = %self.config.name, task_id = %task.id, key = %task.key, attempt = task.attempt, "claimed index task");

        let started = Utc::now();
        let result = match self.sinks.get(&task.key.entity) {
            Some(sink) => sync_isolated(sink.clone(), &task).await,
            None => Err(format!("no index sink registered for {}", task.key.entity)),
        };

        match result {
            Ok(outcome) => {
                task.mark_completed(started);
                self.store.update(&task)?;
                debug!(task_id = %task.id, key = %task.key, ?outcome, "index task completed");
                self.stats.update(|s| {
                    s.tasks_processed += 1;
                    s.tasks_succeeded += 1;
                });
            }
            Err(error) => {
                task.mark_failed(error.clone(), started);
                let dead = matches!(task.status, TaskStatus::DeadLettered { .. });
                if dead {
                    error!(task_id = %task.id, key = %task.key, attempts = task.attempt, error = %error, "index task dead-lettered");
                    self.store.dead_letter(task.clone(), error)?;
                } else {
                    warn!(task_id = %task.id, key = %task.key, attempt = task.attempt, error = %error, "index task failed, will retry");
                    self.store.update(&task)?;
                }
                self.stats.update(|s| {
                    s.tasks_processed += 1;
                    s.tasks_failed += 1;
                    if dead {
                        s.tasks_dead_lettered += 1;
                    }
                });
            }
        }
        Ok(Some(task))
    }

    /// Run tasks until none is ready. Retries still in backoff are left alone.
    pub async fn run_until_idle(&self) -> Result<usize, IndexQueueError> {
        let mut executed = 0;
        while self.run_once().await?.is_some() {
            executed += 1;
        }
        Ok(executed)
    }

    /// Spawn the worker onto the current tokio runtime.
    pub fn spawn(self) -> IndexWorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let stats = self.stats.clone();

        let join = tokio::spawn(async move {
            info!(worker = %self.config.name, "index worker started");
            let started = Instant::now();

            loop {
                if let Err(e) = self.run_until_idle().await {
                    error!(worker = %self.config.name, error = %e, "index worker failed to process tasks");
                }
                self.stats.update(|s| s.uptime_secs = started.elapsed().as_secs());

                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = self.wake.notified() => {}
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }

            info!(worker = %self.config.name, "index worker stopped");
        });

        IndexWorkerHandle {
            shutdown: shutdown_tx,
            join,
            stats,
        }
    }
}

/// Run one sync on its own tokio task so a panicking sink fails the attempt instead
/// of taking the worker down with the task still marked running.
async fn sync_isolated(sink: Arc<dyn IndexSink>, task: &IndexTask) -> Result<SyncOutcome, String> {
    let id = task.key.id;
    match tokio::spawn(async move { sink.sync(id).await }).await {
        Ok(synced) => synced.map_err(|e| e.to_string()),
        Err(e) => {
            error!(task_id = %task.id, key = %task.key, error = %e, "index sync aborted");
            Err(if e.is_panic() {
                "index sync panicked".to_string()
            } else {
                format!("index sync aborted: {e}")
            })
        }
    }
}

/// Handle to a spawned worker.
#[derive(Debug)]
pub struct IndexWorkerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
    stats: WorkerStatsHandle,
}

impl IndexWorkerHandle {
    pub fn stats(&self) -> WorkerStatsHandle {
        self.stats.clone()
    }

    /// Stop after the current batch and wait for the loop to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}
