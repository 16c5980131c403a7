use std::sync::Arc;

use super::{config::RunnerConfig, runner::Runner};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`Runner`] with optional event subscribers.
pub struct RunnerBuilder {
    cfg: RunnerConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl RunnerBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: RunnerConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive every runner event (task lifecycle, batches, status changes)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the runner.
    ///
    /// With subscribers, this spawns their workers and a bus listener, so it must
    /// be called from within a tokio runtime.
    pub fn build(self) -> Runner {
        let subs = if self.subscribers.is_empty() {
            None
        } else {
            Some(SubscriberSet::new(self.subscribers))
        };
        Runner::with_subscribers(self.cfg, subs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::events::Event;
    use crate::tasks::Handler;

    #[derive(Default)]
    struct Topics(Mutex<Vec<String>>);

    #[async_trait]
    impl Subscribe for Topics {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().unwrap().push(ev.topic());
        }
    }

    #[tokio::test]
    async fn subscribers_see_runner_events() {
        let topics = Arc::new(Topics::default());
        let runner = RunnerBuilder::new(RunnerConfig::default())
            .with_subscribers(vec![topics.clone() as Arc<dyn Subscribe>])
            .build();

        runner.add(Handler::sync(|_| {})).unwrap();
        runner.run(false).await;
        tokio::task::yield_now().await;
        runner.shutdown().await;

        let seen = topics.0.lock().unwrap().clone();
        for expected in ["task.created", "status.change", "task.start", "task.done", "end", "reset"] {
            assert!(seen.iter().any(|t| t == expected), "missing {expected} in {seen:?}");
        }
    }
}
