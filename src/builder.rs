//! Task discovery collaborators that feed tasks into a [`Reactor`].

use std::io;
use std::sync::Arc;

use crate::milestone::Milestone;
use crate::reactor::Reactor;
use crate::task::Task;

/// Contributes tasks to a [`Reactor`].
pub trait TaskBuilder {
    /// Returns the tasks this builder contributes.
    ///
    /// The reactor under construction is passed in, so a builder may inspect
    /// it or register follow-up work of its own. I/O failures surface from
    /// [`Reactor::new`] as
    /// [`ReactorError::Discovery`](crate::ReactorError::Discovery).
    fn discover_tasks(&self, reactor: &Reactor) -> io::Result<Vec<Arc<dyn Task>>>;
}

/// Builder that always discovers the same fixed set of tasks.
pub struct FixedTasks {
    tasks: Vec<Arc<dyn Task>>,
}

impl FixedTasks {
    pub fn new(tasks: Vec<Arc<dyn Task>>) -> Self {
        Self { tasks }
    }
}

impl TaskBuilder for FixedTasks {
    fn discover_tasks(&self, _reactor: &Reactor) -> io::Result<Vec<Arc<dyn Task>>> {
        Ok(self.tasks.clone())
    }
}

/// Builder that concatenates the discoveries of several builders.
pub struct Union {
    builders: Vec<Box<dyn TaskBuilder>>,
}

impl Union {
    pub fn new(builders: Vec<Box<dyn TaskBuilder>>) -> Self {
        Self { builders }
    }
}

impl TaskBuilder for Union {
    fn discover_tasks(&self, reactor: &Reactor) -> io::Result<Vec<Arc<dyn Task>>> {
        let mut tasks = Vec::new();
        for builder in &self.builders {
            tasks.extend(builder.discover_tasks(reactor)?);
        }
        Ok(tasks)
    }
}

/// Builder that contributes no tasks.
#[derive(Debug, Default, Clone, Copy)]
pub struct Empty;

impl TaskBuilder for Empty {
    fn discover_tasks(&self, _reactor: &Reactor) -> io::Result<Vec<Arc<dyn Task>>> {
        Ok(Vec::new())
    }
}

/// Fluent builder for small task graphs.
///
/// [`requires`](TaskGraphBuilder::requires),
/// [`attains`](TaskGraphBuilder::attains),
/// [`not_fatal`](TaskGraphBuilder::not_fatal) and
/// [`followed_by`](TaskGraphBuilder::followed_by) configure the *next* call
/// to [`add`](TaskGraphBuilder::add), which consumes that configuration and
/// hands back a [`Handle`]. The handle doubles as a milestone the added task
/// attains implicitly, so later tasks can depend on it without naming a
/// milestone of their own:
///
/// ```
/// use cairn::TaskGraphBuilder;
///
/// let mut graph = TaskGraphBuilder::new();
/// let fetch = graph.add("fetch", |_| Ok(()));
/// graph.requires(&fetch).add("compile", |_| Ok(()));
/// ```
pub struct TaskGraphBuilder {
    tasks: Vec<Arc<BuiltTask>>,
    requires_next: Vec<Milestone>,
    attains_next: Vec<Milestone>,
    fatal_next: bool,
    last: Option<Milestone>,
}

/// Handle to a task added through [`TaskGraphBuilder::add`].
///
/// Converts into the milestone that task attains implicitly.
#[derive(Clone, Debug)]
pub struct Handle {
    milestone: Milestone,
}

impl Handle {
    pub fn milestone(&self) -> &Milestone {
        &self.milestone
    }
}

impl From<Handle> for Milestone {
    fn from(handle: Handle) -> Self {
        handle.milestone
    }
}

impl From<&Handle> for Milestone {
    fn from(handle: &Handle) -> Self {
        handle.milestone.clone()
    }
}

struct BuiltTask {
    name: String,
    requires: Vec<Milestone>,
    attains: Vec<Milestone>,
    fatal: bool,
    work: Box<dyn Fn(&Reactor) -> anyhow::Result<()> + Send + Sync>,
}

impl Task for BuiltTask {
    fn requires(&self) -> Vec<Milestone> {
        self.requires.clone()
    }

    fn attains(&self) -> Vec<Milestone> {
        self.attains.clone()
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn failure_is_fatal(&self) -> bool {
        self.fatal
    }

    fn run(&self, reactor: &Reactor) -> anyhow::Result<()> {
        (self.work)(reactor)
    }
}

impl TaskGraphBuilder {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            requires_next: Vec::new(),
            attains_next: Vec::new(),
            fatal_next: true,
            last: None,
        }
    }

    /// Marks the given milestone as a prerequisite of the next task added.
    pub fn requires(&mut self, milestone: impl Into<Milestone>) -> &mut Self {
        self.requires_next.push(milestone.into());
        self
    }

    /// Marks the next task added as contributing to the given milestone.
    pub fn attains(&mut self, milestone: impl Into<Milestone>) -> &mut Self {
        self.attains_next.push(milestone.into());
        self
    }

    /// The next task added will not abort the reactor when it fails.
    pub fn not_fatal(&mut self) -> &mut Self {
        self.fatal_next = false;
        self
    }

    /// The next task added requires the completion of the last added task.
    pub fn followed_by(&mut self) -> &mut Self {
        if let Some(last) = self.last.clone() {
            self.requires_next.push(last);
        }
        self
    }

    /// Adds a work unit under the accumulated configuration and returns its
    /// handle. The configuration resets afterwards: the following task again
    /// requires nothing, attains nothing beyond its handle, and is fatal.
    pub fn add(
        &mut self,
        display_name: impl Into<String>,
        work: impl Fn(&Reactor) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Handle {
        let name = display_name.into();
        let handle_milestone = Milestone::unique_labeled(&name);
        let mut attains = std::mem::take(&mut self.attains_next);
        attains.push(handle_milestone.clone());
        let task = BuiltTask {
            name,
            requires: std::mem::take(&mut self.requires_next),
            attains,
            fatal: std::mem::replace(&mut self.fatal_next, true),
            work: Box::new(work),
        };
        self.tasks.push(Arc::new(task));
        self.last = Some(handle_milestone.clone());
        Handle {
            milestone: handle_milestone,
        }
    }
}

impl Default for TaskGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBuilder for TaskGraphBuilder {
    fn discover_tasks(&self, _reactor: &Reactor) -> io::Result<Vec<Arc<dyn Task>>> {
        Ok(self
            .tasks
            .iter()
            .map(|task| Arc::clone(task) as Arc<dyn Task>)
            .collect())
    }
}
