//! # Parallel and sequential task dispatch.
//!
//! Both strategies start tasks through [`Task::run`](crate::Task::run) and report
//! each settlement to a [`SettleHook`] as it arrives.
//!
//! ```text
//! parallel:    run(t1) run(t2) ... run(tN) ──► FuturesUnordered ──► settled(..) in completion order
//! sequential:  run(t1).await ──► settled ──► run(t2).await ──► ...   (stops on Refused)
//! ```

use futures::stream::{FuturesUnordered, StreamExt};

use crate::tasks::{Outcome, TaskRef};

/// Observer of task starts and settlements during a dispatch.
pub trait SettleHook: Send {
    /// Called right before a task is started.
    fn starting(&mut self, _task: &TaskRef) {}

    /// Called once per task with the outcome of its run.
    fn settled(&mut self, task: &TaskRef, outcome: Outcome);
}

impl<F> SettleHook for F
where
    F: FnMut(&TaskRef, Outcome) + Send,
{
    fn settled(&mut self, task: &TaskRef, outcome: Outcome) {
        self(task, outcome)
    }
}

/// Starts `task` immediately; the returned future resolves when it settles.
pub(crate) fn launch(task: TaskRef) -> impl Future<Output = (TaskRef, Outcome)> + Send {
    let completion = task.run();
    async move { (task, completion.await) }
}

/// Starts every task at once and waits for all of them.
pub async fn run_parallel(tasks: &[TaskRef], hook: &mut dyn SettleHook) {
    let mut pending = FuturesUnordered::new();
    for task in tasks {
        hook.starting(task);
        pending.push(launch(task.clone()));
    }
    while let Some((task, outcome)) = pending.next().await {
        hook.settled(&task, outcome);
    }
}

/// Runs tasks one after another, each starting only after the previous one settled.
///
/// Stops early once a task refuses to start (the run was aborted).
pub async fn run_sequential(tasks: &[TaskRef], hook: &mut dyn SettleHook) {
    for task in tasks {
        hook.starting(task);
        let outcome = task.run().await;
        hook.settled(task, outcome);
        if outcome == Outcome::Refused {
            break;
        }
    }
}
