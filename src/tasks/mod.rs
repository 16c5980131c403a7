//! # Tasks and task collections.
//!
//! This module provides the task-related types:
//! - [`Task`] - a unit of work with a status state machine ([`TaskRef`] = `Arc<Task>`)
//! - [`TaskConfig`] - raw configuration turned into a task
//! - [`Handler`] / [`Done`] - the work function and its completion handle
//! - [`TaskContext`] - control surface handed to running handlers
//! - [`TaskCollection`] - ordered, named list of tasks with event relays
//! - [`Completion`] / [`Outcome`] - awaiting a started task

mod collection;
mod context;
mod handler;
mod status;
mod task;

pub use collection::{TaskCollection, TaskEntry, TaskTarget};
pub use context::TaskContext;
pub use handler::{BoxHandlerFuture, Done, Handler};
pub use status::TaskStatus;
pub use task::{Completion, Outcome, Task, TaskConfig, TaskRef};
