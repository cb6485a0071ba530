//! The task contract executed by the reactor.

use crate::milestone::Milestone;
use crate::reactor::Reactor;

/// A unit of work with declared milestone prerequisites and contributions.
///
/// A task may start only once every milestone in [`requires`](Task::requires)
/// is attained, and counts towards attaining every milestone in
/// [`attains`](Task::attains) when it finishes, whether it succeeded or
/// failed non-fatally.
pub trait Task: Send + Sync {
    /// Milestones that must be attained before this task may start.
    fn requires(&self) -> Vec<Milestone> {
        Vec::new()
    }

    /// Milestones this task contributes to.
    fn attains(&self) -> Vec<Milestone> {
        Vec::new()
    }

    /// Human-readable name used for progress reporting.
    fn display_name(&self) -> String;

    /// Whether a failure of this task aborts the reactor.
    ///
    /// When `false`, the failure is reported to the listener and execution
    /// continues exactly as if the task had succeeded, so downstream
    /// milestones are still attained.
    fn failure_is_fatal(&self) -> bool {
        true
    }

    /// Performs the work.
    ///
    /// Runs on a worker-pool thread with no reactor lock held, so the task
    /// may call [`Reactor::add`] or [`Reactor::add_all`] to schedule
    /// follow-up work while the execution is underway.
    fn run(&self, reactor: &Reactor) -> anyhow::Result<()>;
}
