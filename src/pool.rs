//! The worker-pool abstraction that runs scheduled nodes.

use std::thread;

/// A unit of work handed to a [`WorkerPool`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A caller-supplied pool of worker threads.
///
/// The reactor submits jobs while holding its internal lock, so `submit`
/// must only enqueue: it has to return promptly and must not call back into
/// the reactor. Every submitted job must eventually run; a pool that drops
/// jobs leaves [`Reactor::execute`](crate::Reactor::execute) blocked
/// forever.
pub trait WorkerPool: Send + Sync {
    /// Enqueues one job to run on some thread.
    fn submit(&self, job: Job);
}

impl WorkerPool for rayon::ThreadPool {
    fn submit(&self, job: Job) {
        self.spawn(job);
    }
}

/// A [`WorkerPool`] that spawns a dedicated thread per job.
///
/// Handy for tests and small graphs; prefer a bounded pool such as
/// [`rayon::ThreadPool`] for anything sizable.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpawnPool;

impl WorkerPool for SpawnPool {
    fn submit(&self, job: Job) {
        thread::spawn(job);
    }
}
