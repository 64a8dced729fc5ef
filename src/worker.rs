//! A small fixed-size pool used to run user completion callbacks off the
//! I/O loop thread, so a slow or panicking callback cannot stall the receive
//! path.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::error;

/// Runs posted closures with bounded concurrency. `post` does not block the
/// caller waiting for a free worker — it spawns a task that waits on the
/// semaphore, so the receive loop that calls `post` is never itself
/// suspended behind a busy pool.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    /// Builds a pool allowing up to `size` callbacks to run concurrently.
    pub fn new(size: usize) -> Self {
        Self { semaphore: Arc::new(Semaphore::new(size.max(1))) }
    }

    /// Schedules `task` to run on a worker. A panic inside `task` is caught
    /// and logged rather than propagated, since this is the one place
    /// caller-supplied code runs.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        let semaphore = self.semaphore.clone();
        tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore never closed");
            if std::panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                error!("worker pool task panicked; callback did not complete normally");
            }
        });
    }
}
