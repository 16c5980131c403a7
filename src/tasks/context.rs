use std::sync::Arc;
use std::time::Duration;

use crate::tasks::{TaskRef, TaskStatus};

/// Control surface handed to a running handler.
///
/// A context is bound to the pass it was created for: after the task is reset,
/// every control operation of an old context is a no-op.
#[derive(Clone)]
pub struct TaskContext {
    task: TaskRef,
    epoch: u64,
}

impl TaskContext {
    pub(crate) fn new(task: TaskRef, epoch: u64) -> Self {
        Self { task, epoch }
    }

    pub fn name(&self) -> &str {
        self.task.name()
    }

    pub fn number(&self) -> usize {
        self.task.number()
    }

    /// Name of the collection that owns the task, if any.
    ///
    /// Handlers reach the collection only by name. Run-level control goes through
    /// [`abort`](Self::abort) and [`timeout`](Self::timeout), which use the runner
    /// capability the task was attached with.
    pub fn queue(&self) -> Option<Arc<str>> {
        self.task.queue()
    }

    pub fn status(&self) -> TaskStatus {
        self.task.status()
    }

    /// Marks the task as failed. The task still finishes through its normal path.
    pub fn fail(&self) {
        self.task.mark_failed(self.epoch);
    }

    /// Requests an abort of the whole run; an unattached task just finishes.
    pub fn abort(&self) {
        self.task.request_abort(self.epoch);
    }

    /// With a duration, (re-)arms the task timer from now; without one, times out immediately.
    pub fn timeout(&self, after: Option<Duration>) {
        match after {
            Some(d) => self.task.arm_timer(self.epoch, d),
            None => self.task.fire_timeout(self.epoch, None),
        }
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("name", &self.name())
            .field("number", &self.number())
            .finish()
    }
}
