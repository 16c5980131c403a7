//! # LogWriter — tracing-backed event writer
//!
//! A minimal subscriber that renders incoming [`Event`]s as `tracing` records.
//! Use it for tests, demos, or as a template for a real exporter.
//!
//! ## Example output (with a `fmt` subscriber installed)
//! ```text
//! INFO taskqueue: [task.start] task="fetch" number=1
//! INFO taskqueue: [task.complete] task="fetch" number=1 status=complete
//! WARN taskqueue: [task.timeout] task="slow" number=2 timeout_ms=500
//! INFO taskqueue: [limited.batch.end] batch=3 tasks=80 duration_ms=300 processing_ms=4
//! INFO taskqueue: [status.change] old=running current=pending
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let topic = e.topic();
        let task = e.task.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::TaskStarted | EventKind::TaskSkipped | EventKind::TaskReset => {
                info!(target: "taskqueue", task, number = e.number, "[{topic}]");
            }
            EventKind::TaskCompleted => {
                let status = e.status.map(|s| s.as_str()).unwrap_or("-");
                info!(target: "taskqueue", task, number = e.number, status, "[{topic}]");
            }
            EventKind::TaskDone | EventKind::Drained => {
                debug!(target: "taskqueue", task, "[{topic}]");
            }
            EventKind::TaskFailed | EventKind::TaskAborted => {
                warn!(target: "taskqueue", task, number = e.number, "[{topic}]");
            }
            EventKind::TaskTimedOut => {
                warn!(target: "taskqueue", task, number = e.number, timeout_ms = e.timeout_ms, "[{topic}]");
            }
            EventKind::RunAborted | EventKind::RunTimedOut => {
                warn!(target: "taskqueue", active = task, "[{topic}]");
            }
            EventKind::Warning => {
                warn!(target: "taskqueue", task, reason = e.reason.as_deref().unwrap_or("-"), "[{topic}]");
            }
            EventKind::StatusChanged => {
                if let Some(change) = e.change {
                    info!(target: "taskqueue", old = %change.old, current = %change.current, "[{topic}]");
                }
            }
            EventKind::BatchStarted | EventKind::BatchEnded => {
                if let Some(b) = e.batch {
                    info!(
                        target: "taskqueue",
                        batch = b.id,
                        tasks = b.tasks,
                        duration_ms = b.duration.map(|d| d.as_millis() as u64),
                        processing_ms = b.processing_time.map(|d| d.as_millis() as u64),
                        "[{topic}]"
                    );
                }
            }
            EventKind::CollectionReset
            | EventKind::TaskCreated
            | EventKind::RunnerReset
            | EventKind::RunEnded => {
                info!(target: "taskqueue", task, "[{topic}]");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
