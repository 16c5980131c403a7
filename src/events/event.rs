//! # Events emitted by tasks, collections, limiters and the runner.
//!
//! The [`EventKind`] enum classifies event types across four sources:
//! - **Task events**: a single task's lifecycle (start, skip, done, timeout, ...)
//! - **Collection events**: collection-wide bookkeeping (reset)
//! - **Runner events**: orchestration (status changes, abort, timeout, end, warnings)
//! - **Limiter events**: batch boundaries and completion of throttles/limiters
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the task name,
//! runner status transitions and batch timing.
//!
//! ## Topics
//! Every event renders a dotted topic (`Event::topic`): the kind's label, prefixed by
//! each relay it travelled through. A task's `start` becomes `task.start` once its
//! collection relays it, and a limiter's `batch.end` becomes `limited.batch.end` on the runner.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Relayed copies keep the `seq` of the original.
//!
//! ## Example
//! ```rust
//! use taskqueue::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskStarted)
//!     .with_task("fetch")
//!     .with_number(1)
//!     .relayed(Some("task."));
//!
//! assert_eq!(ev.kind, EventKind::TaskStarted);
//! assert_eq!(ev.task.as_deref(), Some("fetch"));
//! assert_eq!(ev.topic(), "task.start");
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use tokio::time::Instant;

use crate::core::RunnerStatus;
use crate::tasks::TaskStatus;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of queue events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Task events ===
    /// Task left `pending` and its handler is being invoked.
    ///
    /// Sets: `task`, `number`.
    TaskStarted,

    /// Task was skipped instead of running.
    ///
    /// Sets: `task`, `number`.
    TaskSkipped,

    /// Task finished; `status` carries the terminal status it finished with.
    ///
    /// Sets: `task`, `number`, `status`.
    TaskCompleted,

    /// Task settled for this pass. Completion counting listens for this.
    ///
    /// Sets: `task`, `number`.
    TaskDone,

    /// Task handler marked the task as failed.
    ///
    /// Sets: `task`, `number`.
    TaskFailed,

    /// Per-task timer fired before the task finished.
    ///
    /// Sets: `task`, `number`, `timeout_ms` (if the timer had a duration).
    TaskTimedOut,

    /// Task handler requested an abort of the whole run.
    ///
    /// Sets: `task`, `number`.
    TaskAborted,

    /// Task returned to `pending`.
    ///
    /// Sets: `task`, `number`.
    TaskReset,

    // === Collection events ===
    /// Every task in a collection confirmed its reset.
    ///
    /// Sets: `reason` (collection name).
    CollectionReset,

    // === Runner events ===
    /// Runner created and registered a task via `Runner::add`.
    ///
    /// Sets: `task`, `number`.
    TaskCreated,

    /// Runner status changed.
    ///
    /// Sets: `change`.
    StatusChanged,

    /// Advisory warning (mutation mid-run, run while running, ...).
    ///
    /// Sets: `reason`, optionally `task`.
    Warning,

    /// Runner and all of its tasks are back to `pending`.
    RunnerReset,

    /// Run was aborted by a caller or by a task.
    ///
    /// Sets: `task` (the active task, if known).
    RunAborted,

    /// Global run timeout (or a task timeout) aborted the run.
    ///
    /// Sets: `task` (the active task, if known).
    RunTimedOut,

    /// Every task of the pass reported done.
    RunEnded,

    // === Limiter / throttle events ===
    /// A rate-limited batch is starting.
    ///
    /// Sets: `batch` (`id`, `start`, `tasks`).
    BatchStarted,

    /// A rate-limited batch finished and its minimum duration elapsed.
    ///
    /// Sets: `batch` (all fields).
    BatchEnded,

    /// A throttle or limiter has no more work.
    Drained,
}

impl EventKind {
    /// Returns the un-prefixed topic label of this kind.
    pub fn as_label(self) -> &'static str {
        match self {
            EventKind::TaskStarted => "start",
            EventKind::TaskSkipped => "skip",
            EventKind::TaskCompleted => "complete",
            EventKind::TaskDone => "done",
            EventKind::TaskFailed => "failed",
            EventKind::TaskTimedOut => "timeout",
            EventKind::TaskAborted => "abort",
            EventKind::TaskReset => "reset",
            EventKind::CollectionReset => "collection.reset",
            EventKind::TaskCreated => "task.created",
            EventKind::StatusChanged => "status.change",
            EventKind::Warning => "warning",
            EventKind::RunnerReset => "reset",
            EventKind::RunAborted => "abort",
            EventKind::RunTimedOut => "timeout",
            EventKind::RunEnded => "end",
            EventKind::BatchStarted => "batch.start",
            EventKind::BatchEnded => "batch.end",
            EventKind::Drained => "done",
        }
    }
}

/// Runner status transition carried by [`EventKind::StatusChanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub old: RunnerStatus,
    pub current: RunnerStatus,
}

/// Batch timing carried by [`EventKind::BatchStarted`] / [`EventKind::BatchEnded`].
///
/// `duration` is the enforced elapsed time of the batch (never below the rate-limit
/// window); `processing_time` is how long the tasks themselves took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchInfo {
    /// 1-based batch index, in execution order.
    pub id: usize,
    pub start: Instant,
    pub end: Option<Instant>,
    pub duration: Option<Duration>,
    pub processing_time: Option<Duration>,
    /// Number of tasks in the batch.
    pub tasks: usize,
}

/// Queue event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Topic prefix accumulated while relaying (e.g. `task.`).
    pub prefix: Option<Arc<str>>,
    /// Name of the task, if applicable.
    pub task: Option<Arc<str>>,
    /// Display number of the task, if applicable.
    pub number: Option<usize>,
    /// Task status at the time of the event.
    pub status: Option<TaskStatus>,
    /// Runner status transition.
    pub change: Option<StatusChange>,
    /// Human-readable reason (warnings, collection names, ...).
    pub reason: Option<Arc<str>>,
    /// Task timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Batch timing for limiter events.
    pub batch: Option<BatchInfo>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            prefix: None,
            task: None,
            number: None,
            status: None,
            change: None,
            reason: None,
            timeout_ms: None,
            batch: None,
        }
    }

    /// Returns the dotted topic of this event, including relay prefixes.
    pub fn topic(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}{}", self.kind.as_label()),
            None => self.kind.as_label().to_string(),
        }
    }

    /// Returns a copy of this event as seen through a relay with the given prefix.
    ///
    /// The new prefix is prepended to any prefix the event already carries.
    pub fn relayed(&self, prefix: Option<&str>) -> Self {
        let mut ev = self.clone();
        if let Some(p) = prefix {
            ev.prefix = Some(match &self.prefix {
                Some(old) => Arc::from(format!("{p}{old}")),
                None => Arc::from(p),
            });
        }
        ev
    }

    /// Attaches a task name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a task display number.
    #[inline]
    pub fn with_number(mut self, number: usize) -> Self {
        self.number = Some(number);
        self
    }

    /// Attaches a task status.
    #[inline]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches a runner status transition.
    #[inline]
    pub fn with_change(mut self, old: RunnerStatus, current: RunnerStatus) -> Self {
        self.change = Some(StatusChange { old, current });
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Attaches batch timing.
    #[inline]
    pub fn with_batch(mut self, batch: BatchInfo) -> Self {
        self.batch = Some(batch);
        self
    }

    /// Convenience for advisory warnings.
    #[inline]
    pub fn warning(reason: impl Into<Arc<str>>) -> Self {
        Event::new(EventKind::Warning).with_reason(reason)
    }
}
