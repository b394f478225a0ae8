//! Index task storage.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::types::{DeadLetterEntry, IndexTask, RecordKey, TaskId, TaskStatus};

/// Index task store abstraction.
///
/// Two rules keep the index converging on the primary store:
/// - `enqueue` folds a task into a waiting task for the same record instead of
///   adding a second one, so only the latest write per record is outstanding.
/// - `claim_next` only hands out the oldest live task of a record, so updates to one
///   record never run concurrently or out of order.
pub trait IndexTaskStore: Send + Sync {
    /// Enqueue a task; returns the id of the task that now carries it.
    fn enqueue(&self, task: IndexTask) -> Result<TaskId, IndexQueueError>;

    fn get(&self, task_id: TaskId) -> Result<Option<IndexTask>, IndexQueueError>;

    /// Persist a task's new state. Completed tasks leave the store.
    fn update(&self, task: &IndexTask) -> Result<(), IndexQueueError>;

    /// Claim the next ready task, marking it running.
    fn claim_next(&self) -> Result<Option<IndexTask>, IndexQueueError>;

    /// Move a task to the dead-letter list.
    fn dead_letter(&self, task: IndexTask, reason: String) -> Result<(), IndexQueueError>;

    /// Oldest first.
    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, IndexQueueError>;

    /// Put a dead-lettered task back in the queue with a fresh attempt budget.
    fn retry_dead_letter(&self, task_id: TaskId) -> Result<TaskId, IndexQueueError>;

    fn delete_dead_letter(&self, task_id: TaskId) -> Result<(), IndexQueueError>;

    fn stats(&self) -> Result<TaskStats, IndexQueueError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexQueueError {
    #[error("index task not found: {0}")]
    NotFound(TaskId),
    #[error("index task already exists: {0}")]
    AlreadyExists(TaskId),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct TaskStats {
    pub pending: usize,
    pub running: usize,
    pub failed: usize,
    pub completed: u64,
    pub dead_lettered: usize,
}

/// In-memory task store.
///
/// Live tasks are kept in one lane per record, oldest first. Only a lane's head can
/// run, and a head that is waiting sits in `ready`, ordered by when it may next
/// run. Enqueue, claim and update are `O(log n)`.
#[derive(Debug, Default)]
pub struct InMemoryIndexTaskStore {
    queue: RwLock<Lanes>,
    dead_letters: RwLock<HashMap<TaskId, DeadLetterEntry>>,
    completed: AtomicU64,
}

#[derive(Debug)]
struct Slot {
    task: IndexTask,
    /// Position in arrival order; breaks ties between heads due at the same instant.
    seq: u64,
    queued_at: DateTime<Utc>,
}

impl Slot {
    fn ready_key(&self) -> ReadyKey {
        let due = self.task.scheduled_at.unwrap_or(self.queued_at);
        (due, self.seq, self.task.id)
    }
}

type ReadyKey = (DateTime<Utc>, u64, TaskId);

#[derive(Debug, Default)]
struct Lanes {
    slots: HashMap<TaskId, Slot>,
    lanes: HashMap<RecordKey, VecDeque<TaskId>>,
    ready: BTreeSet<ReadyKey>,
    next_seq: u64,
}

impl Lanes {
    /// The waiting task at the back of the record's lane. Only the newest live task
    /// of a record can be waiting behind a running one, so this is the one a new
    /// write may fold into.
    fn waiting_tail(&mut self, key: &RecordKey) -> Option<&mut Slot> {
        let id = *self.lanes.get(key)?.back()?;
        self.slots.get_mut(&id).filter(|slot| slot.task.status.is_waiting())
    }

    /// Fold `incoming` into a waiting task for the same record, if there is one.
    fn coalesce(&mut self, incoming: &IndexTask) -> Option<TaskId> {
        let waiting = self.waiting_tail(&incoming.key)?;
        waiting.task.op = incoming.op;
        waiting.task.updated_at = Utc::now();
        Some(waiting.task.id)
    }

    /// Append a task to the back of its record's lane.
    fn push(&mut self, task: IndexTask) {
        let slot = Slot {
            seq: self.next_seq,
            queued_at: Utc::now(),
            task,
        };
        self.next_seq += 1;

        let id = slot.task.id;
        let lane = self.lanes.entry(slot.task.key.clone()).or_default();
        lane.push_back(id);
        if lane.len() == 1 {
            self.ready.insert(slot.ready_key());
        }
        self.slots.insert(id, slot);
    }

    /// Drop a task from the store along with its lane and ready entries.
    fn remove(&mut self, id: TaskId) -> Option<Slot> {
        let slot = self.slots.remove(&id)?;
        self.ready.remove(&slot.ready_key());
        if let Some(lane) = self.lanes.get_mut(&slot.task.key) {
            if lane.front() == Some(&id) {
                lane.pop_front();
            } else {
                lane.retain(|queued| *queued != id);
            }
            if lane.is_empty() {
                self.lanes.remove(&slot.task.key);
            }
        }
        self.promote_head(&slot.task.key);
        Some(slot)
    }

    /// Make the record's head claimable once it is waiting.
    fn promote_head(&mut self, key: &RecordKey) {
        let Some(head) = self.lanes.get(key).and_then(|lane| lane.front()) else {
            return;
        };
        if let Some(slot) = self.slots.get(head) {
            if slot.task.status.is_waiting() {
                self.ready.insert(slot.ready_key());
            }
        }
    }

    fn claim(&mut self, now: DateTime<Utc>) -> Option<IndexTask> {
        let first = *self.ready.first()?;
        if first.0 > now {
            return None;
        }
        self.ready.remove(&first);
        let slot = self.slots.get_mut(&first.2)?;
        slot.task.mark_running();
        Some(slot.task.clone())
    }
}

impl InMemoryIndexTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned() -> IndexQueueError {
    IndexQueueError::Storage("in-memory task store lock poisoned".to_string())
}

impl IndexTaskStore for InMemoryIndexTaskStore {
    fn enqueue(&self, task: IndexTask) -> Result<TaskId, IndexQueueError> {
        let mut queue = self.queue.write().map_err(|_| poisoned())?;
        if queue.slots.contains_key(&task.id) {
            return Err(IndexQueueError::AlreadyExists(task.id));
        }
        if let Some(existing) = queue.coalesce(&task) {
            return Ok(existing);
        }
        let id = task.id;
        queue.push(task);
        Ok(id)
    }

    fn get(&self, task_id: TaskId) -> Result<Option<IndexTask>, IndexQueueError> {
        let queue = self.queue.read().map_err(|_| poisoned())?;
        Ok(queue.slots.get(&task_id).map(|slot| slot.task.clone()))
    }

    fn update(&self, task: &IndexTask) -> Result<(), IndexQueueError> {
        let mut queue = self.queue.write().map_err(|_| poisoned())?;
        let Some(slot) = queue.slots.get(&task.id) else {
            return Err(IndexQueueError::NotFound(task.id));
        };
        if task.status == TaskStatus::Completed {
            queue.remove(task.id);
            self.completed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let stale = slot.ready_key();
        queue.ready.remove(&stale);
        if let Some(slot) = queue.slots.get_mut(&task.id) {
            slot.task = task.clone();
        }
        queue.promote_head(&task.key);
        Ok(())
    }

    fn claim_next(&self) -> Result<Option<IndexTask>, IndexQueueError> {
        let mut queue = self.queue.write().map_err(|_| poisoned())?;
        Ok(queue.claim(Utc::now()))
    }

    fn dead_letter(&self, mut task: IndexTask, reason: String) -> Result<(), IndexQueueError> {
        let mut queue = self.queue.write().map_err(|_| poisoned())?;
        let mut dls = self.dead_letters.write().map_err(|_| poisoned())?;

        task.status = TaskStatus::DeadLettered {
            error: reason.clone(),
            attempts: task.attempt,
        };
        task.updated_at = Utc::now();

        queue.remove(task.id);
        dls.insert(task.id, DeadLetterEntry::new(task, reason));
        Ok(())
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, IndexQueueError> {
        let dls = self.dead_letters.read().map_err(|_| poisoned())?;
        let mut result: Vec<_> = dls.values().cloned().collect();
        result.sort_by_key(|e| e.dead_lettered_at);
        result.truncate(limit);
        Ok(result)
    }

    fn retry_dead_letter(&self, task_id: TaskId) -> Result<TaskId, IndexQueueError> {
        let mut queue = self.queue.write().map_err(|_| poisoned())?;
        let mut dls = self.dead_letters.write().map_err(|_| poisoned())?;

        let entry = dls.remove(&task_id).ok_or(IndexQueueError::NotFound(task_id))?;
        let mut task = entry.task;
        task.revive();

        // A newer write for the same record is already queued; it covers this one.
        if let Some(existing) = queue.coalesce(&task) {
            return Ok(existing);
        }
        // Back of the lane: a task already running for the record finishes first.
        queue.push(task);
        Ok(task_id)
    }

    fn delete_dead_letter(&self, task_id: TaskId) -> Result<(), IndexQueueError> {
        let mut dls = self.dead_letters.write().map_err(|_| poisoned())?;
        dls.remove(&task_id).map(|_| ()).ok_or(IndexQueueError::NotFound(task_id))
    }

    fn stats(&self) -> Result<TaskStats, IndexQueueError> {
        let queue = self.queue.read().map_err(|_| poisoned())?;
        let dls = self.dead_letters.read().map_err(|_| poisoned())?;

        let mut stats = TaskStats {
            completed: self.completed.load(Ordering::Relaxed),
            dead_lettered: dls.len(),
            ..TaskStats::default()
        };
        for slot in queue.slots.values() {
            match slot.task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Failed { .. } => stats.failed += 1,
                TaskStatus::Completed | TaskStatus::DeadLettered { .. } => {}
            }
        }
        Ok(stats)
    }
}
