//! Milestone identity values used as join points in the task graph.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// A named synchronization point in the task graph.
///
/// Tasks declare the milestones they require and the milestones they attain;
/// the reactor wires these declarations into a bipartite DAG. A milestone is
/// attained once every task attaining it has finished, so it acts as a join
/// between otherwise unrelated tasks.
///
/// Milestones are pure identity values: the reactor only ever compares and
/// hashes them. Two identity schemes are available:
///
/// - [`Milestone::named`] milestones compare equal by name, so independent
///   parts of a program can rendezvous on a well-known string.
/// - [`Milestone::unique`] milestones compare equal only to their own clones,
///   which makes them usable as private handles that nobody else can attain
///   by accident.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Milestone(Ident);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Ident {
    Named(Arc<str>),
    Unique { id: Uuid, label: Option<Arc<str>> },
}

impl Milestone {
    /// A milestone identified by its name.
    pub fn named(name: impl AsRef<str>) -> Self {
        Milestone(Ident::Named(Arc::from(name.as_ref())))
    }

    /// A milestone equal only to its own clones.
    pub fn unique() -> Self {
        Milestone(Ident::Unique {
            id: Uuid::new_v4(),
            label: None,
        })
    }

    /// Like [`Milestone::unique`], but carrying a label used for display.
    ///
    /// The label takes no part in equality: two milestones with the same
    /// label are still distinct.
    pub fn unique_labeled(label: impl AsRef<str>) -> Self {
        Milestone(Ident::Unique {
            id: Uuid::new_v4(),
            label: Some(Arc::from(label.as_ref())),
        })
    }

    /// The name or label, if there is one.
    pub fn name(&self) -> Option<&str> {
        match &self.0 {
            Ident::Named(name) => Some(name),
            Ident::Unique { label, .. } => label.as_deref(),
        }
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Ident::Named(name) => f.write_str(name),
            Ident::Unique {
                label: Some(label), ..
            } => f.write_str(label),
            Ident::Unique { id, .. } => write!(f, "milestone-{}", id.simple()),
        }
    }
}

impl From<&Milestone> for Milestone {
    fn from(milestone: &Milestone) -> Self {
        milestone.clone()
    }
}
