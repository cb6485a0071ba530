//! Error types for reactor construction and execution.

use thiserror::Error;

/// Error returned by the fallible [`Reactor`](crate::Reactor) operations.
#[derive(Debug, Error)]
pub enum ReactorError {
    /// A task builder failed with an I/O error while discovering tasks.
    #[error("task discovery failed: {0}")]
    Discovery(#[from] std::io::Error),

    /// [`execute`](crate::Reactor::execute) was invoked on a reactor that
    /// already ran once. Reactors are single-use.
    #[error("reactor has already been executed")]
    AlreadyExecuted,

    /// A fatal task or listener failure aborted the execution.
    ///
    /// `cause` is the error that aborted the run. `suppressed` holds any
    /// further errors that were raised while the cause was being reported,
    /// in the order they occurred; when a listener failed while reporting a
    /// task failure, the original task error is the last entry.
    #[error("reactor aborted: {cause}")]
    Aborted {
        cause: anyhow::Error,
        suppressed: Vec<anyhow::Error>,
    },
}

impl ReactorError {
    /// The error that aborted the execution, if any.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            ReactorError::Aborted { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// Errors suppressed while the cause was being reported.
    pub fn suppressed(&self) -> &[anyhow::Error] {
        match self {
            ReactorError::Aborted { suppressed, .. } => suppressed,
            _ => &[],
        }
    }
}

/// A primary error bundled with further errors raised while the primary one
/// was being handled.
///
/// Produced by [`Aggregator`](crate::Aggregator) when more than one of its
/// listeners fails on the same event: the first failure stays the primary
/// error and every later one is kept here instead of being lost. The reactor
/// unpacks the bundle when it records a fatal failure, so all of them end up
/// on [`ReactorError::Aborted`].
#[derive(Debug, Error)]
#[error("{primary}")]
pub struct Suppressed {
    primary: anyhow::Error,
    suppressed: Vec<anyhow::Error>,
}

impl Suppressed {
    pub fn new(primary: anyhow::Error, suppressed: Vec<anyhow::Error>) -> Self {
        Self { primary, suppressed }
    }

    pub fn primary(&self) -> &anyhow::Error {
        &self.primary
    }

    pub fn suppressed(&self) -> &[anyhow::Error] {
        &self.suppressed
    }

    pub fn into_parts(self) -> (anyhow::Error, Vec<anyhow::Error>) {
        (self.primary, self.suppressed)
    }
}

/// Splits an error into its primary cause and any suppressed companions.
pub(crate) fn split(error: anyhow::Error) -> (anyhow::Error, Vec<anyhow::Error>) {
    match error.downcast::<Suppressed>() {
        Ok(bundle) => bundle.into_parts(),
        Err(error) => (error, Vec::new()),
    }
}

/// Internal envelope carrying a user error from a worker thread back to the
/// thread blocked in `execute`.
#[derive(Debug)]
pub(crate) struct Tunnel {
    pub(crate) cause: anyhow::Error,
    pub(crate) suppressed: Vec<anyhow::Error>,
}

impl Tunnel {
    pub(crate) fn new(cause: anyhow::Error) -> Self {
        Self {
            cause,
            suppressed: Vec::new(),
        }
    }

    /// Builds a tunnel from a listener error, unpacking any [`Suppressed`]
    /// bundle an aggregator may have produced.
    pub(crate) fn from_listener(error: anyhow::Error) -> Self {
        let (cause, suppressed) = split(error);
        Self { cause, suppressed }
    }
}

impl From<Tunnel> for ReactorError {
    fn from(tunnel: Tunnel) -> Self {
        ReactorError::Aborted {
            cause: tunnel.cause,
            suppressed: tunnel.suppressed,
        }
    }
}
