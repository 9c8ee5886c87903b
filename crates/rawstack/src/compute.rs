//! The execution context every compute stage runs on.
//!
//! One explicitly-constructed thread pool, created at pipeline construction
//! and threaded through the stages; no process-wide singletons. Stage
//! dispatches are scoped on this pool; scope completion is the point the
//! host blocks on before reading stage results.

use {
    crate::error::{Error, Result},
    anyhow::Context,
    std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

pub struct ComputeContext {
    pool: rayon::ThreadPool,
    cancel: Arc<AtomicBool>,
}

impl ComputeContext {
    /// `threads = None` sizes the pool to the machine.
    pub fn new(threads: Option<usize>) -> Result<Self> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads.unwrap_or_else(num_cpus::get))
            .thread_name(|index| format!("rawstack-compute-{index}"))
            .build()
            .context("building the compute thread pool")
            .map_err(Error::Compute)
            .map(|pool| Self {
                pool,
                cancel: Arc::new(AtomicBool::new(false)),
            })
    }

    /// Runs `op` with rayon parallelism bound to this context's pool and
    /// blocks until it completes.
    pub fn run<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Cooperative cancellation: flips a flag the orchestrator checks at
    /// stage boundaries. Work already dispatched runs to completion.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` when the flag is set; called before each
    /// stage dispatch.
    pub fn checkpoint(&self) -> Result<()> {
        match self.is_cancelled() {
            true => Err(Error::Cancelled),
            false => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_executes_on_the_owned_pool() {
        let ctx = ComputeContext::new(Some(2)).unwrap();
        assert_eq!(ctx.threads(), 2);
        let sum: u64 = ctx.run(|| {
            use rayon::prelude::*;
            (0..1000u64).into_par_iter().sum()
        });
        assert_eq!(sum, 499_500);
    }

    #[test]
    fn checkpoint_trips_after_cancel() {
        let ctx = ComputeContext::new(Some(1)).unwrap();
        assert!(ctx.checkpoint().is_ok());
        ctx.cancel();
        assert!(matches!(ctx.checkpoint(), Err(Error::Cancelled)));
    }
}
