use std::time::Duration;

use crate::tasks::TaskStatus;

/// Read-only projection of a runner's remaining work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Plan {
    pub tasks_remaining: usize,
    pub tasks_completed: usize,
    /// Theoretical floor on total run time; `None` unless a rate limit is configured.
    pub minimum_duration: Option<Duration>,
}

/// Completion counters of the current (or last) pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// Fraction of tasks done, in `0.0..=1.0`. An empty pass counts as done.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// One row of [`Runner::list`](crate::Runner::list).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskSummary {
    pub number: usize,
    pub name: String,
    pub status: TaskStatus,
}
