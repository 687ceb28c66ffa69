//! Bounded Worker Pool
//!
//! Runs CPU-bound request work off the I/O path with a hard cap on running
//! and waiting jobs. A full pool rejects new work instead of queueing it
//! without bound.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Jobs running at once
    pub workers: usize,
    /// Jobs allowed to wait for a free worker
    pub queue: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            queue: 1000,
        }
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub active: usize,
    pub waiting: usize,
    pub rejected: usize,
}

/// Bounded pool for blocking jobs.
pub struct WorkerPool {
    name: String,
    config: WorkerPoolConfig,
    /// Permits for jobs admitted (running + waiting)
    admitted: Arc<Semaphore>,
    /// Permits for jobs running
    workers: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    rejected: AtomicUsize,
}

impl WorkerPool {
    /// Create a new worker pool.
    pub fn new(name: impl Into<String>, config: WorkerPoolConfig) -> Self {
        Self {
            name: name.into(),
            admitted: Arc::new(Semaphore::new(config.workers + config.queue)),
            workers: Arc::new(Semaphore::new(config.workers)),
            active: Arc::new(AtomicUsize::new(0)),
            rejected: AtomicUsize::new(0),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `job` on a worker and wait for its result.
    ///
    /// Fails fast with [`PoolError::Saturated`] when every worker and queue
    /// slot is taken. A panicking job is reported as [`PoolError::Panicked`].
    pub async fn run<F, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let admission = match self.admitted.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(tokio::sync::TryAcquireError::Closed) => return Err(PoolError::Closed),
            Err(tokio::sync::TryAcquireError::NoPermits) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "worker pool {} saturated: workers={} queue={}",
                    self.name,
                    self.config.workers,
                    self.config.queue
                );
                return Err(PoolError::Saturated);
            }
        };

        let worker = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        let active = self.active.clone();
        active.fetch_add(1, Ordering::Relaxed);

        let handle = tokio::task::spawn_blocking(move || {
            let _worker = worker;
            let _admission = admission;
            let _active = ActiveGuard(active);
            job()
        });

        handle.await.map_err(|e| {
            if e.is_panic() {
                PoolError::Panicked(panic_message(e.into_panic()))
            } else {
                PoolError::Cancelled
            }
        })
    }

    /// Stop admitting new jobs. Running jobs complete normally.
    pub fn close(&self) {
        self.admitted.close();
        self.workers.close();
    }

    pub fn is_closed(&self) -> bool {
        self.admitted.is_closed()
    }

    /// Get pool counters.
    pub fn stats(&self) -> PoolStats {
        let capacity = self.config.workers + self.config.queue;
        let admitted = capacity.saturating_sub(self.admitted.available_permits());
        let active = self.active.load(Ordering::Relaxed);
        PoolStats {
            active,
            waiting: admitted.saturating_sub(active),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Decrements the active counter when a job finishes, panicking or not.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Worker pool errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("worker pool saturated")]
    Saturated,
    #[error("worker pool closed")]
    Closed,
    #[error("job panicked: {0}")]
    Panicked(String),
    #[error("job cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn pool(workers: usize, queue: usize) -> Arc<WorkerPool> {
        Arc::new(WorkerPool::new("test", WorkerPoolConfig { workers, queue }))
    }

    #[tokio::test]
    async fn test_run_returns_result() {
        let pool = pool(2, 2);
        let value = pool.run(|| 21 * 2).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(pool.name(), "test");
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let pool = pool(1, 0);
        let result: Result<(), _> = pool.run(|| panic!("diff exploded")).await;
        assert_eq!(result, Err(PoolError::Panicked("diff exploded".to_string())));

        // The worker is released after a panic
        assert_eq!(pool.run(|| 1).await, Ok(1));
        assert_eq!(pool.stats().active, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_saturation_rejects() {
        let pool = pool(1, 0);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        let busy = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.run(move || {
                    let _ = started_tx.send(());
                    let _ = release_rx.recv();
                })
                .await
            })
        };
        started_rx.await.unwrap();

        assert_eq!(pool.run(|| ()).await, Err(PoolError::Saturated));
        assert_eq!(pool.stats().rejected, 1);
        assert_eq!(pool.stats().active, 1);

        release_tx.send(()).unwrap();
        assert!(busy.await.unwrap().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queued_job_waits_for_worker() {
        let pool = pool(1, 1);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        let busy = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.run(move || {
                    let _ = started_tx.send(());
                    let _ = release_rx.recv();
                })
                .await
            })
        };
        started_rx.await.unwrap();

        let queued = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.run(|| "done").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pool.stats().waiting, 1);

        release_tx.send(()).unwrap();
        assert!(busy.await.unwrap().is_ok());
        assert_eq!(queued.await.unwrap(), Ok("done"));
    }

    #[tokio::test]
    async fn test_closed_pool_rejects() {
        let pool = pool(1, 1);
        pool.close();
        assert!(pool.is_closed());
        assert_eq!(pool.run(|| ()).await, Err(PoolError::Closed));
    }
}
