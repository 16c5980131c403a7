use std::fmt;

/// Lifecycle state of a [`Runner`](crate::Runner).
///
/// ```text
/// Pending ──► Running ──► Pending            (end → automatic reset)
///                └──────► Aborting ──► Aborted
///                └──────► Timeout
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunnerStatus {
    #[default]
    Pending,
    Running,
    Aborting,
    Aborted,
    Timeout,
}

impl RunnerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunnerStatus::Pending => "pending",
            RunnerStatus::Running => "running",
            RunnerStatus::Aborting => "aborting",
            RunnerStatus::Aborted => "aborted",
            RunnerStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for RunnerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
