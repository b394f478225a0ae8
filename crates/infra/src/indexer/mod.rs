//! Search-index synchronization.
//!
//! Every primary-store write leaves an [`IndexTask`] behind. The [`IndexWorker`]
//! drains them in the background, reconciling the search index with whatever the
//! primary store holds for that record. Failed tasks back off and retry; tasks that
//! exhaust their attempts are dead-lettered for inspection and manual retry.

pub mod store;
pub mod types;
pub mod worker;

pub use store::{InMemoryIndexTaskStore, IndexQueueError, IndexTaskStore, TaskStats};
pub use types::{
    BackoffStrategy, DeadLetterEntry, IndexOp, IndexTask, RecordKey, RetryPolicy, TaskAttemptRecord, TaskId,
    TaskStatus,
};
pub use worker::{
    IndexQueue, IndexSink, IndexWorker, IndexWorkerConfig, IndexWorkerHandle, RecordSync, SyncError, SyncOutcome,
    WorkerStats, WorkerStatsHandle,
};
