//! Internal bipartite DAG of task and milestone nodes.
//!
//! Tasks and milestones are both nodes of a single directed graph. Edges run
//! `milestone -> task` for every required milestone and `task -> milestone`
//! for every attained one, so a task's prerequisites are always milestones
//! and a milestone's prerequisites are always its contributing tasks. A
//! milestone node with no contributing task has no prerequisites and is
//! therefore attained immediately.
//!
//! The graph is only ever read or mutated under the reactor lock.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::milestone::Milestone;
use crate::task::Task;

/// What a node does when it is scheduled.
#[derive(Clone)]
pub(crate) enum NodeKind {
    /// Run the task and fire its started/completed/failed events.
    Task(Arc<dyn Task>),
    /// Fire the milestone's attained event.
    Milestone(Milestone),
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Task(task) => write!(f, "Task({})", task.display_name()),
            NodeKind::Milestone(milestone) => write!(f, "Milestone({milestone})"),
        }
    }
}

/// One node of the bipartite DAG.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    /// Set exactly once, when the node is handed to the pool. Implies every
    /// prerequisite was done at that moment.
    pub(crate) submitted: bool,
    /// Set exactly once, when the node's action has finished.
    pub(crate) done: bool,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            submitted: false,
            done: false,
        }
    }
}

/// Bipartite DAG storage with milestone memoization.
#[derive(Debug)]
pub(crate) struct Dag {
    graph: DiGraph<Node, ()>,
    /// Milestone nodes, interned by milestone identity.
    milestones: IndexMap<Milestone, NodeIndex>,
    /// Task nodes in insertion order.
    task_nodes: Vec<NodeIndex>,
}

impl Dag {
    pub(crate) fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            milestones: IndexMap::new(),
            task_nodes: Vec::new(),
        }
    }

    /// Materializes a node for every task in the batch and wires all edges.
    ///
    /// The whole batch is wired before the caller attempts any scheduling,
    /// so a task cannot become runnable while a sibling that contributes one
    /// of its prerequisites is still missing. Returns the new task nodes.
    pub(crate) fn insert_batch(&mut self, tasks: Vec<Arc<dyn Task>>) -> Vec<NodeIndex> {
        let mut new_nodes = Vec::with_capacity(tasks.len());
        for task in tasks {
            let requires = task.requires();
            let attains = task.attains();
            let index = self.graph.add_node(Node::new(NodeKind::Task(task)));
            for milestone in requires {
                let prerequisite = self.milestone_node(milestone);
                self.graph.update_edge(prerequisite, index, ());
            }
            for milestone in attains {
                let contribution = self.milestone_node(milestone);
                self.graph.update_edge(index, contribution, ());
            }
            self.task_nodes.push(index);
            new_nodes.push(index);
        }
        new_nodes
    }

    /// Fetches or creates the node interning the given milestone.
    fn milestone_node(&mut self, milestone: Milestone) -> NodeIndex {
        if let Some(&index) = self.milestones.get(&milestone) {
            return index;
        }
        let index = self
            .graph
            .add_node(Node::new(NodeKind::Milestone(milestone.clone())));
        self.milestones.insert(milestone, index);
        index
    }

    /// A node may be handed to the pool once it has not been submitted yet
    /// and every prerequisite is done.
    pub(crate) fn is_runnable(&self, index: NodeIndex) -> bool {
        !self.graph[index].submitted
            && self
                .graph
                .neighbors_directed(index, Direction::Incoming)
                .all(|prerequisite| self.graph[prerequisite].done)
    }

    pub(crate) fn mark_submitted(&mut self, index: NodeIndex) {
        self.graph[index].submitted = true;
    }

    pub(crate) fn mark_done(&mut self, index: NodeIndex) {
        self.graph[index].done = true;
    }

    pub(crate) fn node(&self, index: NodeIndex) -> &Node {
        &self.graph[index]
    }

    /// Nodes that have this node as a prerequisite.
    pub(crate) fn downstream(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect()
    }

    /// Every milestone node currently known, in creation order.
    pub(crate) fn milestone_nodes(&self) -> Vec<NodeIndex> {
        self.milestones.values().copied().collect()
    }

    /// Every node, task and milestone alike.
    pub(crate) fn node_indices(&self) -> Vec<NodeIndex> {
        self.graph.node_indices().collect()
    }

    /// Number of task nodes. Milestone nodes are not counted.
    pub(crate) fn task_count(&self) -> usize {
        self.task_nodes.len()
    }

    /// Snapshot of every registered task, in insertion order.
    pub(crate) fn tasks(&self) -> Vec<Arc<dyn Task>> {
        self.task_nodes
            .iter()
            .map(|&index| match &self.graph[index].kind {
                NodeKind::Task(task) => Arc::clone(task),
                NodeKind::Milestone(_) => unreachable!("task_nodes holds task nodes only"),
            })
            .collect()
    }
}
