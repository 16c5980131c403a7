//! # Ordered, named collection of tasks.
//!
//! A [`TaskCollection`] owns tasks in insertion order and relays their events:
//!
//! ```text
//! task bus ──relay("task.")──► collection bus ──► (runner bus, when runner-owned)
//! ```
//!
//! ## Rules
//! - A task belongs to at most one collection at a time; adding an attached task fails.
//! - `add_all` validates every entry before attaching any of them.
//! - Tasks without an explicit number get `len + 1` at insertion time.
//! - Removing or clearing detaches tasks (relays are torn down).

use std::sync::{Arc, Weak};

use tokio::sync::broadcast;
use tracing::debug;

use crate::core::RunControl;
use crate::error::QueueError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{Task, TaskConfig, TaskRef};

/// Something that can be inserted into a collection.
#[derive(Debug)]
pub enum TaskEntry {
    /// An existing, unattached task.
    Task(TaskRef),
    /// Raw configuration, built into a task on insertion.
    Config(TaskConfig),
}

impl From<TaskRef> for TaskEntry {
    fn from(task: TaskRef) -> Self {
        TaskEntry::Task(task)
    }
}

impl From<TaskConfig> for TaskEntry {
    fn from(cfg: TaskConfig) -> Self {
        TaskEntry::Config(cfg)
    }
}

/// Selects a task for removal.
#[derive(Debug, Clone)]
pub enum TaskTarget {
    Task(TaskRef),
    Index(usize),
}

impl From<TaskRef> for TaskTarget {
    fn from(task: TaskRef) -> Self {
        TaskTarget::Task(task)
    }
}

impl From<usize> for TaskTarget {
    fn from(index: usize) -> Self {
        TaskTarget::Index(index)
    }
}

/// Named, ordered list of tasks.
pub struct TaskCollection {
    name: Arc<str>,
    items: Vec<TaskRef>,
    bus: Bus,
    control: Option<Weak<dyn RunControl>>,
}

impl TaskCollection {
    /// Creates a standalone collection with its own bus.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            items: Vec::new(),
            bus: Bus::default(),
            control: None,
        }
    }

    /// Creates a runner-owned collection: events go straight to `bus` and tasks
    /// receive the runner's control handle.
    pub(crate) fn owned(name: Arc<str>, bus: Bus, control: Weak<dyn RunControl>) -> Self {
        Self {
            name,
            items: Vec::new(),
            bus,
            control: Some(control),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends a single task.
    pub fn add(&mut self, entry: impl Into<TaskEntry>) -> Result<TaskRef, QueueError> {
        let mut added = self.add_all([entry.into()])?;
        added
            .pop()
            .ok_or_else(|| QueueError::argument("no task was added"))
    }

    /// Appends tasks in order. Nothing is added if any entry is invalid.
    pub fn add_all(
        &mut self,
        entries: impl IntoIterator<Item = TaskEntry>,
    ) -> Result<Vec<TaskRef>, QueueError> {
        let mut staged: Vec<TaskRef> = Vec::new();
        for entry in entries {
            let task = match entry {
                TaskEntry::Task(task) => task,
                TaskEntry::Config(mut cfg) => {
                    if cfg.number.is_none() {
                        cfg.number = Some(self.items.len() + staged.len() + 1);
                    }
                    Task::new(cfg)?
                }
            };
            if task.is_attached() {
                return Err(QueueError::argument(format!(
                    "task \"{}\" already belongs to a queue",
                    task.name()
                )));
            }
            if staged.iter().any(|t| Arc::ptr_eq(t, &task)) {
                return Err(QueueError::argument(format!(
                    "task \"{}\" was given twice",
                    task.name()
                )));
            }
            staged.push(task);
        }

        for task in &staged {
            task.attach(Arc::clone(&self.name), &self.bus, self.control.clone())?;
            self.items.push(Arc::clone(task));
        }
        debug!(queue = %self.name, added = staged.len(), "tasks added");
        Ok(staged)
    }

    /// Removes tasks by reference or index and returns the removed tasks.
    ///
    /// Indices refer to positions before any removal. An out-of-range index fails
    /// without removing anything; a reference that is not in the collection is ignored.
    pub fn remove(
        &mut self,
        targets: impl IntoIterator<Item = TaskTarget>,
    ) -> Result<Vec<TaskRef>, QueueError> {
        let mut doomed: Vec<TaskRef> = Vec::new();
        for target in targets {
            let task = match target {
                TaskTarget::Index(i) => self.items.get(i).cloned().ok_or_else(|| {
                    QueueError::argument(format!(
                        "index {i} is out of range for the \"{}\" queue ({} tasks)",
                        self.name,
                        self.items.len()
                    ))
                })?,
                TaskTarget::Task(task) => match self.items.iter().find(|t| Arc::ptr_eq(t, &task)) {
                    Some(found) => Arc::clone(found),
                    None => continue,
                },
            };
            if !doomed.iter().any(|t| Arc::ptr_eq(t, &task)) {
                doomed.push(task);
            }
        }

        self.items
            .retain(|t| !doomed.iter().any(|d| Arc::ptr_eq(d, t)));
        for task in &doomed {
            task.detach();
        }
        Ok(doomed)
    }

    /// Resets every task to `pending`, then publishes `collection.reset`.
    pub fn reset(&self) {
        for task in &self.items {
            task.reset();
        }
        self.bus
            .publish(Event::new(EventKind::CollectionReset).with_reason(Arc::clone(&self.name)));
    }

    /// Detaches and drops every task.
    pub fn clear(&mut self) {
        for task in self.items.drain(..) {
            task.detach();
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|t| t.name().to_string()).collect()
    }

    /// Snapshot of the tasks in order.
    pub fn tasks(&self) -> Vec<TaskRef> {
        self.items.clone()
    }

    pub fn get(&self, index: usize) -> Option<TaskRef> {
        self.items.get(index).cloned()
    }

    /// First task with the given name.
    pub fn find(&self, name: &str) -> Option<TaskRef> {
        self.items.iter().find(|t| t.name() == name).cloned()
    }

    /// Index of the given task, if it belongs to this collection.
    pub fn position(&self, task: &TaskRef) -> Option<usize> {
        self.items.iter().position(|t| Arc::ptr_eq(t, task))
    }

    /// Receives the collection's events, including relayed `task.*` events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }
}

impl std::fmt::Debug for TaskCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCollection")
            .field("name", &self.name)
            .field("tasks", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{Handler, TaskStatus};

    fn noop(name: &str) -> TaskEntry {
        TaskConfig::named(name).handler(Handler::sync(|_| {})).into()
    }

    #[test]
    fn numbers_follow_insertion_order() {
        let mut c = TaskCollection::new("q");
        c.add(noop("a")).unwrap();
        let added = c.add_all([noop("b"), noop("c")]).unwrap();
        assert_eq!(added.iter().map(|t| t.number()).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(c.names(), vec!["a", "b", "c"]);
        assert_eq!(c.get(0).unwrap().queue().as_deref(), Some("q"));
    }

    #[tokio::test]
    async fn handler_sees_owning_queue_by_name() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let mut c = TaskCollection::new("imports");
        let task = c
            .add(TaskConfig::named("t").handler(Handler::sync({
                let seen = Arc::clone(&seen);
                move |ctx| *seen.lock().unwrap() = ctx.queue()
            })))
            .unwrap();
        task.run().await;
        assert_eq!(seen.lock().unwrap().as_deref(), Some("imports"));

        c.remove([TaskTarget::Task(Arc::clone(&task))]).unwrap();
        task.reset();
        task.run().await;
        assert!(seen.lock().unwrap().is_none());
    }

    #[test]
    fn invalid_entry_adds_nothing() {
        let mut c = TaskCollection::new("q");
        let err = c
            .add_all([noop("a"), TaskConfig::named("broken").into()])
            .unwrap_err();
        assert_eq!(err.as_label(), "queue_invalid_configuration");
        assert!(c.is_empty());
    }

    #[test]
    fn task_cannot_join_two_collections() {
        let task = Task::arc("shared", Handler::sync(|_| {}));
        let mut a = TaskCollection::new("a");
        let mut b = TaskCollection::new("b");
        a.add(Arc::clone(&task)).unwrap();
        assert!(b.add(Arc::clone(&task)).is_err());

        a.remove([TaskTarget::from(Arc::clone(&task))]).unwrap();
        assert!(task.queue().is_none());
        b.add(task).unwrap();
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn remove_by_index_uses_original_positions() {
        let mut c = TaskCollection::new("q");
        c.add_all([noop("a"), noop("b"), noop("c")]).unwrap();
        let removed = c.remove([TaskTarget::Index(0), TaskTarget::Index(2)]).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(c.names(), vec!["b"]);

        assert!(c.remove([TaskTarget::Index(5)]).is_err());
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn task_events_are_relayed_with_prefix() {
        let mut c = TaskCollection::new("q");
        let task = c.add(noop("a")).unwrap();
        let mut rx = c.subscribe();

        task.run().await;
        c.reset();

        let topics: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.topic())
            .collect();
        assert_eq!(
            topics,
            vec!["task.start", "task.complete", "task.done", "task.reset", "collection.reset"]
        );
        assert_eq!(task.status(), TaskStatus::Pending);
    }

    #[test]
    fn clear_detaches() {
        let mut c = TaskCollection::new("q");
        let task = c.add(noop("a")).unwrap();
        c.clear();
        assert!(c.is_empty());
        assert!(task.queue().is_none());
    }
}
