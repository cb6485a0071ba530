//! The reactor core: owns the DAG and drives it to completion over a
//! caller-supplied worker pool.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use petgraph::graph::NodeIndex;
use tracing::{debug, warn};

use crate::builder::TaskBuilder;
use crate::error::{ReactorError, Tunnel};
use crate::graph::{Dag, NodeKind};
use crate::listener::{Listener, Noop};
use crate::milestone::Milestone;
use crate::pool::WorkerPool;
use crate::task::Task;

/// Hook wrapping every task invocation; see [`Reactor::set_run_hook`].
pub type RunHook = Arc<dyn Fn(&Reactor, &dyn Task) -> anyhow::Result<()> + Send + Sync>;

/// Concurrent executor for tasks whose dependencies are expressed through
/// [`Milestone`] join points.
///
/// Tasks never reference each other directly. Instead each task declares the
/// milestones it requires and the milestones it attains, and the reactor
/// materializes a bipartite DAG out of those declarations: a task may start
/// once all of its required milestones are attained, and a milestone is
/// attained once all tasks contributing to it have finished. A milestone
/// nobody contributes to is attained immediately.
///
/// [`execute`](Reactor::execute) dispatches runnable work onto a
/// caller-supplied [`WorkerPool`] and blocks until the whole graph is done,
/// reporting progress through a [`Listener`]. Tasks may keep adding work
/// with [`add`](Reactor::add) / [`add_all`](Reactor::add_all) while the
/// execution is underway. A reactor runs exactly once.
///
/// Cloning is shallow: every clone shares the same underlying graph and
/// execution state.
#[derive(Clone)]
pub struct Reactor {
    shared: Arc<Shared>,
}

struct Shared {
    inner: Mutex<Inner>,
    /// Signalled on every node completion; `execute` blocks on it.
    idle: Condvar,
}

struct Inner {
    dag: Dag,
    /// Number of nodes submitted to the pool but not yet done.
    pending: usize,
    /// First fatal failure. Once set, nothing further is scheduled;
    /// already-submitted nodes still run to completion.
    fatal: Option<Tunnel>,
    /// Present only while `execute` runs.
    pool: Option<Arc<dyn WorkerPool>>,
    /// Present only while `execute` runs.
    listener: Option<Arc<dyn Listener>>,
    executed: bool,
    run_hook: Option<RunHook>,
}

impl Reactor {
    /// Creates a reactor populated with the tasks discovered by each builder
    /// in turn.
    ///
    /// Builders receive the partially-built reactor, so they may inspect it
    /// or register follow-up tasks of their own. A builder's I/O failure
    /// surfaces as [`ReactorError::Discovery`].
    pub fn new(builders: &[&dyn TaskBuilder]) -> Result<Self, ReactorError> {
        let reactor = Reactor {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    dag: Dag::new(),
                    pending: 0,
                    fatal: None,
                    pool: None,
                    listener: None,
                    executed: false,
                    run_hook: None,
                }),
                idle: Condvar::new(),
            }),
        };
        for builder in builders {
            let tasks = builder.discover_tasks(&reactor)?;
            reactor.add_all(tasks);
        }
        Ok(reactor)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner.lock().expect("reactor lock poisoned")
    }

    /// Number of registered tasks. Milestone nodes are not counted.
    pub fn len(&self) -> usize {
        self.lock().dag.task_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the registered tasks, in insertion order.
    pub fn tasks(&self) -> Vec<Arc<dyn Task>> {
        self.lock().dag.tasks()
    }

    /// Installs a hook that wraps every task invocation.
    ///
    /// The hook replaces the plain [`Task::run`] call and is responsible for
    /// performing it, which lets callers bracket each task with per-task
    /// context such as a thread-local "current task" marker:
    ///
    /// ```
    /// # let reactor = cairn::Reactor::new(&[]).unwrap();
    /// reactor.set_run_hook(|reactor, task| {
    ///     tracing::info_span!("task", name = %task.display_name())
    ///         .in_scope(|| task.run(reactor))
    /// });
    /// ```
    pub fn set_run_hook(
        &self,
        hook: impl Fn(&Reactor, &dyn Task) -> anyhow::Result<()> + Send + Sync + 'static,
    ) {
        self.lock().run_hook = Some(Arc::new(hook));
    }

    /// Adds a single task; see [`Reactor::add_all`].
    pub fn add(&self, task: Arc<dyn Task>) {
        self.add_all([task]);
    }

    /// Adds a batch of tasks atomically.
    ///
    /// Every task of the batch is materialized and wired before any of them
    /// is considered for scheduling. Adding related tasks one at a time
    /// instead would let an early task start, and even finish, before a
    /// later sibling contributes one of its prerequisites.
    ///
    /// May be called before or during execution, including from inside
    /// [`Task::run`].
    pub fn add_all(&self, tasks: impl IntoIterator<Item = Arc<dyn Task>>) {
        let tasks: Vec<Arc<dyn Task>> = tasks.into_iter().collect();
        if tasks.is_empty() {
            return;
        }
        let mut inner = self.lock();
        let new_nodes = inner.dag.insert_batch(tasks);
        debug!(
            added = new_nodes.len(),
            total = inner.dag.task_count(),
            "tasks added"
        );
        for index in new_nodes {
            self.try_run(&mut inner, index);
        }
        // A new contributing task changes the prerequisites of milestone
        // nodes that may already exist, so every known milestone is retried.
        for index in inner.dag.milestone_nodes() {
            self.try_run(&mut inner, index);
        }
    }

    /// Runs the graph to completion on `pool`, reporting progress to
    /// `listener`.
    ///
    /// Blocks the calling thread until every node is done, or until a fatal
    /// failure is recorded, in which case the failure is returned as
    /// [`ReactorError::Aborted`] without waiting for nodes still in flight
    /// (there is no cancellation; submitted tasks run to completion on the
    /// pool). The pool and listener references are released before
    /// returning, on both paths.
    ///
    /// A reactor executes at most once; a second call returns
    /// [`ReactorError::AlreadyExecuted`].
    pub fn execute(
        &self,
        pool: Arc<dyn WorkerPool>,
        listener: Arc<dyn Listener>,
    ) -> Result<(), ReactorError> {
        let mut inner = self.lock();
        if inner.executed {
            return Err(ReactorError::AlreadyExecuted);
        }
        inner.executed = true;
        inner.pool = Some(pool);
        inner.listener = Some(listener);

        // Start everything that can run. The sources are the nodes without
        // prerequisites: tasks requiring nothing, and dangling milestones.
        for index in inner.dag.node_indices() {
            self.try_run(&mut inner, index);
        }

        let result = loop {
            if let Some(fatal) = inner.fatal.take() {
                break Err(ReactorError::from(fatal));
            }
            if inner.pending == 0 {
                break Ok(());
            }
            inner = self
                .shared
                .idle
                .wait(inner)
                .expect("reactor lock poisoned");
        };

        // Release the pool and listener so the reactor does not retain them
        // past execution.
        inner.pool = None;
        inner.listener = None;
        result
    }

    /// Submits the node to the pool if it is runnable.
    ///
    /// Caller holds the reactor lock. Submitting from inside the lock keeps
    /// the submitted/pending bookkeeping atomic; the pool only enqueues, so
    /// the critical section stays short.
    fn try_run(&self, inner: &mut Inner, index: NodeIndex) {
        if inner.fatal.is_some() {
            return;
        }
        let Some(pool) = inner.pool.clone() else {
            return;
        };
        if !inner.dag.is_runnable(index) {
            return;
        }
        inner.dag.mark_submitted(index);
        inner.pending += 1;
        debug!(node = index.index(), pending = inner.pending, "node submitted");
        let reactor = self.clone();
        pool.submit(Box::new(move || reactor.run_node(index)));
    }

    /// Worker-thread entry point for one node.
    ///
    /// The action body runs without the reactor lock, so user code is free
    /// to re-enter [`Reactor::add_all`] from its own thread.
    fn run_node(&self, index: NodeIndex) {
        let (kind, listener, hook) = {
            let inner = self.lock();
            let listener = inner
                .listener
                .clone()
                .unwrap_or_else(|| Arc::new(Noop) as Arc<dyn Listener>);
            (inner.dag.node(index).kind.clone(), listener, inner.run_hook.clone())
        };

        let outcome = match &kind {
            NodeKind::Milestone(milestone) => self.attain(milestone, &listener),
            NodeKind::Task(task) => self.run_task(task.as_ref(), &listener, hook),
        };
        if outcome.is_err() {
            warn!(node = ?kind, "fatal failure recorded");
        }

        let mut inner = self.lock();
        inner.dag.mark_done(index);
        if let Err(tunnel) = outcome {
            if inner.fatal.is_none() {
                inner.fatal = Some(tunnel);
            }
        }
        if inner.fatal.is_none() {
            for downstream in inner.dag.downstream(index) {
                self.try_run(&mut inner, downstream);
            }
        }
        inner.pending -= 1;
        self.shared.idle.notify_all();
    }

    fn attain(&self, milestone: &Milestone, listener: &Arc<dyn Listener>) -> Result<(), Tunnel> {
        debug!(%milestone, "milestone attained");
        listener.on_attained(milestone).map_err(Tunnel::from_listener)
    }

    /// The task-node action: started event, the run itself, then exactly one
    /// of the completed/failed events.
    fn run_task(
        &self,
        task: &dyn Task,
        listener: &Arc<dyn Listener>,
        hook: Option<RunHook>,
    ) -> Result<(), Tunnel> {
        // A failing on_task_started is a reactor failure, not a task
        // failure: the task is not run at all.
        listener
            .on_task_started(task)
            .map_err(Tunnel::from_listener)?;

        let ran = match &hook {
            Some(hook) => hook(self, task),
            None => task.run(self),
        };

        match ran {
            Ok(()) => listener
                .on_task_completed(task)
                .map_err(Tunnel::from_listener),
            Err(error) => {
                let fatal = task.failure_is_fatal();
                let tunnel = match listener.on_task_failed(task, &error, fatal) {
                    Ok(()) => Tunnel::new(error),
                    Err(listener_error) => {
                        // The listener failure becomes the primary error and
                        // the task's own failure rides along as suppressed.
                        let mut tunnel = Tunnel::from_listener(listener_error);
                        tunnel.suppressed.push(error);
                        tunnel
                    }
                };
                if fatal {
                    Err(tunnel)
                } else {
                    debug!(task = %task.display_name(), "non-fatal failure, continuing");
                    Ok(())
                }
            }
        }
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shared.inner.try_lock() {
            Ok(inner) => f
                .debug_struct("Reactor")
                .field("tasks", &inner.dag.task_count())
                .field("pending", &inner.pending)
                .field("executed", &inner.executed)
                .finish(),
            Err(_) => f.write_str("Reactor { <locked> }"),
        }
    }
}
