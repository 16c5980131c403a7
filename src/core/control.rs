//! # Run control capability.
//!
//! Tasks never see the [`Runner`](crate::Runner) itself. When a task joins a
//! runner-owned collection it receives a weak handle to a [`RunControl`]: the
//! only two things a task may ask of its runner.
//!
//! ```text
//! Task::run()          ──► may_start()        (refuse to start once the pass is aborted)
//! TaskContext::abort() ──► abort(false, task)
//! task timer fires     ──► abort(true, task)
//! ```

/// Narrow capability a runner lends to the tasks it owns.
pub(crate) trait RunControl: Send + Sync {
    /// Returns `false` once the current pass was aborted; tasks must not start.
    fn may_start(&self) -> bool;

    /// Aborts the current pass. Idempotent: only the first call has an effect.
    fn abort(&self, timeout: bool, active: Option<&str>);
}
