//! Concurrent task reactor with milestone join points.
//!
//! This crate executes a set of inter-dependent units of work whose
//! dependencies are expressed not directly between tasks but through named
//! synchronization points called [`Milestone`]s:
//!
//! - Each [`Task`] declares the milestones it *requires* and the milestones
//!   it *attains*.
//! - The [`Reactor`] materializes a bipartite DAG of task and milestone
//!   nodes, dispatches runnable work to a caller-supplied [`WorkerPool`],
//!   and propagates completions through the graph.
//! - A milestone is attained once every task contributing to it has
//!   finished; a milestone nobody contributes to is attained immediately.
//! - Tasks may add further tasks while the execution is underway.
//! - Progress is reported through a [`Listener`]; several listeners combine
//!   with [`Aggregator`].
//!
//! A task whose [`failure_is_fatal`](Task::failure_is_fatal) is `false` may
//! fail without aborting the run: the failure is reported and the graph
//! proceeds exactly as if the task had succeeded. A fatal failure stops all
//! further scheduling and surfaces from [`Reactor::execute`] as
//! [`ReactorError::Aborted`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cairn::{Noop, Reactor, SpawnPool, TaskGraphBuilder};
//!
//! # fn main() -> Result<(), cairn::ReactorError> {
//! let mut graph = TaskGraphBuilder::new();
//! let fetch = graph.add("fetch", |_| Ok(()));
//! graph.requires(&fetch).add("compile", |_| Ok(()));
//!
//! let reactor = Reactor::new(&[&graph])?;
//! reactor.execute(Arc::new(SpawnPool), Arc::new(Noop))?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod error;
mod graph;
pub mod listener;
pub mod milestone;
pub mod pool;
pub mod reactor;
pub mod task;

pub use builder::{Empty, FixedTasks, Handle, TaskBuilder, TaskGraphBuilder, Union};
pub use error::{ReactorError, Suppressed};
pub use listener::{Aggregator, Listener, Noop};
pub use milestone::Milestone;
pub use pool::{Job, SpawnPool, WorkerPool};
pub use reactor::{Reactor, RunHook};
pub use task::Task;
