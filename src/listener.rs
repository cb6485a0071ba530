//! Progress callbacks fired during reactor execution.

use std::sync::Arc;

use crate::error::Suppressed;
use crate::milestone::Milestone;
use crate::task::Task;

/// Receives callbacks while [`Reactor::execute`](crate::Reactor::execute)
/// runs.
///
/// Callbacks are invoked on the worker-pool threads and may therefore arrive
/// concurrently; implementations that need serialization must provide their
/// own. Every method defaults to doing nothing.
///
/// Returning an `Err` from a callback is fatal to the reactor, with one
/// exception: an error from [`on_task_failed`](Listener::on_task_failed)
/// reporting a *non-fatal* task failure is swallowed along with the failure
/// itself.
pub trait Listener: Send + Sync {
    /// The task is about to start.
    fn on_task_started(&self, task: &dyn Task) -> anyhow::Result<()> {
        let _ = task;
        Ok(())
    }

    /// The task finished successfully. Called on the same thread that ran
    /// the task.
    fn on_task_completed(&self, task: &dyn Task) -> anyhow::Result<()> {
        let _ = task;
        Ok(())
    }

    /// The task failed.
    ///
    /// `fatal` mirrors [`Task::failure_is_fatal`]: when `false` the reactor
    /// keeps going after this report, when `true` it is about to abort.
    fn on_task_failed(
        &self,
        task: &dyn Task,
        error: &anyhow::Error,
        fatal: bool,
    ) -> anyhow::Result<()> {
        let _ = (task, error, fatal);
        Ok(())
    }

    /// The milestone was attained: every task contributing to it has
    /// finished.
    fn on_attained(&self, milestone: &Milestone) -> anyhow::Result<()> {
        let _ = milestone;
        Ok(())
    }
}

/// Listener that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct Noop;

impl Listener for Noop {}

/// Bundles multiple listeners into one.
///
/// Every event fans out to each sub-listener in registration order. If some
/// of them fail, the remaining ones still see the event; the first error is
/// returned with the later ones attached as a [`Suppressed`] bundle, so no
/// failure is lost.
pub struct Aggregator {
    listeners: Vec<Arc<dyn Listener>>,
}

impl Aggregator {
    pub fn new(listeners: Vec<Arc<dyn Listener>>) -> Self {
        Self { listeners }
    }

    fn fan_out(&self, call: impl Fn(&dyn Listener) -> anyhow::Result<()>) -> anyhow::Result<()> {
        let mut primary: Option<anyhow::Error> = None;
        let mut rest = Vec::new();
        for listener in &self.listeners {
            if let Err(error) = call(listener.as_ref()) {
                if primary.is_none() {
                    primary = Some(error);
                } else {
                    rest.push(error);
                }
            }
        }
        match primary {
            None => Ok(()),
            Some(error) if rest.is_empty() => Err(error),
            Some(error) => Err(anyhow::Error::new(Suppressed::new(error, rest))),
        }
    }
}

impl Listener for Aggregator {
    fn on_task_started(&self, task: &dyn Task) -> anyhow::Result<()> {
        self.fan_out(|listener| listener.on_task_started(task))
    }

    fn on_task_completed(&self, task: &dyn Task) -> anyhow::Result<()> {
        self.fan_out(|listener| listener.on_task_completed(task))
    }

    fn on_task_failed(
        &self,
        task: &dyn Task,
        error: &anyhow::Error,
        fatal: bool,
    ) -> anyhow::Result<()> {
        self.fan_out(|listener| listener.on_task_failed(task, error, fatal))
    }

    fn on_attained(&self, milestone: &Milestone) -> anyhow::Result<()> {
        self.fan_out(|listener| listener.on_attained(milestone))
    }
}
