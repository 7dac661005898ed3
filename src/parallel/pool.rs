//! Fixed-size Rayon pool for dataset tasks.
//!
//! Tasks block on network and disk, so the pool is sized from configuration
//! rather than from the CPU count.

use rayon::prelude::*;
use rayon::{ThreadPoolBuildError, ThreadPoolBuilder};

pub const DEFAULT_WORKERS: usize = 5;

/// Number of dataset tasks allowed in flight at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    pub workers: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

impl WorkerPool {
    /// Use exactly `n` worker threads (at least one).
    pub fn with_workers(n: usize) -> Self {
        Self { workers: n.max(1) }
    }

    /// Run a closure on a dedicated pool with this worker count.
    pub fn install<F, R>(&self, f: F) -> Result<R, ThreadPoolBuildError>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|index| format!("ingest-worker-{index}"))
            .build()?;
        Ok(pool.install(f))
    }

    /// Apply `task` to every item on the pool and wait for all of them.
    /// Results come back in input order regardless of completion order.
    pub fn run_all<I, R, F>(&self, items: &[I], task: F) -> Result<Vec<R>, ThreadPoolBuildError>
    where
        I: Sync,
        R: Send,
        F: Fn(&I) -> R + Sync + Send,
    {
        self.install(|| items.par_iter().map(|item| task(item)).collect())
    }
}
