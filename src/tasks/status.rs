use std::fmt;

/// Lifecycle state of a single [`Task`](crate::Task).
///
/// ```text
/// Pending ──► Running ──► Complete | Failed | TimedOut
///    └──────► Skipped
/// ```
///
/// Every state except `Pending` and `Running` is terminal for the current pass;
/// [`Task::reset`](crate::Task::reset) returns any state to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Failed,
    TimedOut,
    Skipped,
}

impl TaskStatus {
    /// Returns `true` for states that end the current pass.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Complete | TaskStatus::Failed | TaskStatus::TimedOut | TaskStatus::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Complete => "complete",
            TaskStatus::Failed => "failed",
            TaskStatus::TimedOut => "timedout",
            TaskStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
