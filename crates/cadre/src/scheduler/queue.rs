//! Admission accounting: the running set, the FIFO queue and promotion.
//!
//! [`QueueState`] is plain data with no locking, no timers and no callbacks.
//! [`TaskScheduler`](super::TaskScheduler) owns exactly one instance behind
//! a mutex and turns the transitions returned here into events, runner
//! callbacks and watchdog timers after the lock is released.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

use serde::Serialize;

use crate::task::{TaskId, TaskStatus};

/// Admission decision for a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    StartImmediately,
    Queue,
}

impl Admission {
    pub fn as_str(self) -> &'static str {
        match self {
            Admission::StartImmediately => "start_immediately",
            Admission::Queue => "queue",
        }
    }

    /// The status a task should carry after this decision.
    pub fn task_status(self) -> TaskStatus {
        match self {
            Admission::StartImmediately => TaskStatus::Running,
            Admission::Queue => TaskStatus::Queued,
        }
    }
}

impl fmt::Display for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a running task counts as a sub-agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Main,
    SubAgent,
}

/// Read view over the scheduler's sets.
///
/// `running_count` includes sub-agents and may exceed `max_concurrent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub running_count: usize,
    pub queued_count: usize,
    pub running_task_ids: BTreeSet<TaskId>,
    /// Queued tasks in release order.
    pub queued_task_ids: Vec<TaskId>,
    pub max_concurrent: usize,
    pub sub_agent_count: usize,
}

impl QueueStatus {
    pub fn to_log_string(&self) -> String {
        format!(
            "running {}/{} ({} sub-agents), queued {}",
            self.running_count, self.max_concurrent, self.sub_agent_count, self.queued_count
        )
    }
}

/// A task moved into a slot; `epoch` identifies this particular admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Started {
    pub task_id: TaskId,
    pub epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EnqueueEffect {
    Admitted { epoch: u64, running_count: usize },
    Queued { position: usize },
    /// The task was already running or queued; nothing changed.
    Unchanged,
}

/// A running task left its slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Released {
    pub epoch: u64,
    pub promoted: Vec<Started>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Cancelled {
    /// Removed from the queue; no slot was consumed.
    Queued,
    Running(Released),
    Unknown,
}

#[derive(Debug, Clone, Copy)]
struct RunEntry {
    kind: SlotKind,
    epoch: u64,
}

/// When the queue holds this many more tombstones than live entries it is
/// compacted.
const TOMBSTONE_SLACK: usize = 32;

#[derive(Debug)]
pub(crate) struct QueueState {
    max_concurrent: usize,
    running: HashMap<TaskId, RunEntry>,
    /// FIFO of `(task, sequence)`. Entries whose sequence no longer matches
    /// `queued` are tombstones left by cancellation.
    order: VecDeque<(TaskId, u64)>,
    queued: HashMap<TaskId, u64>,
    next_seq: u64,
    next_epoch: u64,
}

impl QueueState {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            running: HashMap::new(),
            order: VecDeque::new(),
            queued: HashMap::new(),
            next_seq: 0,
            next_epoch: 1,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn is_running(&self, task_id: &TaskId) -> bool {
        self.running.contains_key(task_id)
    }

    pub fn is_queued(&self, task_id: &TaskId) -> bool {
        self.queued.contains_key(task_id)
    }

    pub fn enqueue(&mut self, task_id: &TaskId, kind: SlotKind) -> (Admission, EnqueueEffect) {
        if self.running.contains_key(task_id) {
            return (Admission::StartImmediately, EnqueueEffect::Unchanged);
        }
        if self.queued.contains_key(task_id) {
            return (Admission::Queue, EnqueueEffect::Unchanged);
        }

        // Sub-agents bypass the limit unconditionally: a parent holding a
        // slot may block on them.
        if kind == SlotKind::SubAgent || self.running.len() < self.max_concurrent {
            let epoch = self.occupy(task_id.clone(), kind);
            return (
                Admission::StartImmediately,
                EnqueueEffect::Admitted {
                    epoch,
                    running_count: self.running.len(),
                },
            );
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.push_back((task_id.clone(), seq));
        self.queued.insert(task_id.clone(), seq);
        (
            Admission::Queue,
            EnqueueEffect::Queued {
                position: self.queued.len() - 1,
            },
        )
    }

    /// Release a running task's slot and promote queued tasks into free
    /// slots. Returns `None` if the task was not running.
    pub fn finish(&mut self, task_id: &TaskId) -> Option<Released> {
        let entry = self.running.remove(task_id)?;
        Some(Released {
            epoch: entry.epoch,
            promoted: self.promote(),
        })
    }

    /// Like [`finish`](Self::finish), but only if the task is still running
    /// under the given admission epoch.
    pub fn finish_epoch(&mut self, task_id: &TaskId, epoch: u64) -> Option<Released> {
        match self.running.get(task_id) {
            Some(entry) if entry.epoch == epoch => self.finish(task_id),
            _ => None,
        }
    }

    pub fn cancel(&mut self, task_id: &TaskId) -> Cancelled {
        if self.queued.remove(task_id).is_some() {
            self.compact_order();
            return Cancelled::Queued;
        }
        match self.finish(task_id) {
            Some(released) => Cancelled::Running(released),
            None => Cancelled::Unknown,
        }
    }

    /// Change the limit. Raising it promotes immediately; lowering it never
    /// evicts running tasks.
    pub fn set_max_concurrent(&mut self, max_concurrent: usize) -> Vec<Started> {
        self.max_concurrent = max_concurrent;
        self.promote()
    }

    pub fn status(&self) -> QueueStatus {
        let queued_task_ids: Vec<TaskId> = self
            .order
            .iter()
            .filter(|(id, seq)| self.queued.get(id) == Some(seq))
            .map(|(id, _)| id.clone())
            .collect();
        QueueStatus {
            running_count: self.running.len(),
            queued_count: queued_task_ids.len(),
            running_task_ids: self.running.keys().cloned().collect(),
            queued_task_ids,
            max_concurrent: self.max_concurrent,
            sub_agent_count: self
                .running
                .values()
                .filter(|e| e.kind == SlotKind::SubAgent)
                .count(),
        }
    }

    fn occupy(&mut self, task_id: TaskId, kind: SlotKind) -> u64 {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        self.running.insert(task_id, RunEntry { kind, epoch });
        epoch
    }

    /// Move queued tasks into free slots in FIFO order. Any freed slot
    /// counts, including one released by a sub-agent.
    fn promote(&mut self) -> Vec<Started> {
        let mut started = Vec::new();
        while self.running.len() < self.max_concurrent {
            let Some((task_id, seq)) = self.order.pop_front() else {
                break;
            };
            if self.queued.get(&task_id) != Some(&seq) {
                continue;
            }
            self.queued.remove(&task_id);
            let epoch = self.occupy(task_id.clone(), SlotKind::Main);
            started.push(Started { task_id, epoch });
        }
        started
    }

    fn compact_order(&mut self) {
        if self.order.len() > self.queued.len() * 2 + TOMBSTONE_SLACK {
            let queued = &self.queued;
            self.order.retain(|(id, seq)| queued.get(id) == Some(seq));
        }
    }
}
