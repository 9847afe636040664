//! # Worker Pool
//!
//! A fixed set of background workers draining one shared FIFO queue.
//!
//! ## Overview
//!
//! - [`WorkerPool::submit`] enqueues a future and returns immediately; the
//!   queue is unbounded so the caller never waits.
//! - Each worker loops: dequeue (parked while the queue is empty), run the
//!   task to completion, log any error or panic, dequeue again. A failing task
//!   never takes its worker down and never blocks the tasks queued behind it.
//! - Tasks have no result handle. Completion is observed only through the
//!   side effects the task performs (state updates, emitted events).
//!
//! The pool is created once at startup and shared by handle; clones refer to
//! the same workers. Blocking work (FTP sessions, zip extraction) must be moved
//! onto `spawn_blocking` by the task itself.
//!
//! ## Lifecycle
//!
//! [`WorkerPool::shutdown`] closes the queue, lets the workers finish every
//! task already queued, and joins them. Dropping the last handle without
//! calling it has the same draining effect but nothing waits for it.
//!
//! ## Limitations
//!
//! Tasks cannot be cancelled and have no deadline: once dequeued, a task runs
//! until it succeeds or fails on its own.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Unit of work accepted by the pool.
pub type Task = BoxFuture<'static, anyhow::Result<()>>;

/// Counters describing finished tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub completed: u64,
    pub failed: u64,
    pub panicked: u64,
}

impl PoolStats {
    pub fn finished(&self) -> u64 {
        self.completed + self.failed + self.panicked
    }
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

struct PoolInner {
    sender: async_channel::Sender<Task>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
    counters: Arc<Counters>,
}

/// Shared handle to the process-wide worker pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Spawns `size` workers on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `size` is zero
    /// - [`Error::Internal`] if called outside a tokio runtime
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Config(
                "Worker pool needs at least one worker".to_string(),
            ));
        }

        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::Internal(format!("Worker pool requires a tokio runtime: {}", e))
        })?;

        let (sender, receiver) = async_channel::unbounded::<Task>();
        let counters = Arc::new(Counters::default());

        let workers = (0..size)
            .map(|index| handle.spawn(worker_loop(index, receiver.clone(), counters.clone())))
            .collect();

        info!(workers = size, "Worker pool started");

        Ok(Self {
            inner: Arc::new(PoolInner {
                sender,
                workers: Mutex::new(workers),
                size,
                counters,
            }),
        })
    }

    /// Enqueues `task` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolClosed`] after [`shutdown`](Self::shutdown).
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner
            .sender
            .try_send(task.boxed())
            .map_err(|_| Error::PoolClosed)
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Tasks queued but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.inner.sender.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.sender.is_closed()
    }

    /// Snapshot of the finished-task counters.
    pub fn stats(&self) -> PoolStats {
        let c = &self.inner.counters;
        PoolStats {
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            panicked: c.panicked.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting tasks, drains the queue and joins every worker.
    ///
    /// Idempotent; later calls return immediately.
    pub async fn shutdown(&self) {
        self.inner.sender.close();

        let workers: Vec<JoinHandle<()>> = {
            let mut guard = self
                .inner
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };

        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Worker terminated abnormally");
            }
        }

        debug!(stats = ?self.stats(), "Worker pool stopped");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.inner.size)
            .field("queued", &self.queued())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn worker_loop(index: usize, receiver: async_channel::Receiver<Task>, counters: Arc<Counters>) {
    debug!(worker = index, "Worker started");

    while let Ok(task) = receiver.recv().await {
        match AssertUnwindSafe(task).catch_unwind().await {
            Ok(Ok(())) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker = index, error = %format!("{:#}", e), "Task failed");
            }
            Err(panic) => {
                counters.panicked.fetch_add(1, Ordering::Relaxed);
                error!(worker = index, panic = %panic_message(&*panic), "Task panicked");
            }
        }
    }

    debug!(worker = index, "Worker exiting, queue closed");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_requires_runtime() {
        assert!(matches!(WorkerPool::new(2), Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let pool = WorkerPool::new(1).unwrap();
        pool.shutdown().await;

        assert!(pool.is_closed());
        assert!(matches!(pool.submit(async { Ok(()) }), Err(Error::PoolClosed)));
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let pool = WorkerPool::new(1).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let done = done.clone();
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }

        pool.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 4);
        assert_eq!(pool.stats().completed, 4);
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_kill_worker() {
        let pool = WorkerPool::new(1).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        pool.submit(async {
            let payload: Option<u8> = None;
            payload.expect("boom");
            Ok(())
        })
        .unwrap();
        let d = done.clone();
        pool.submit(async move {
            d.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        pool.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(
            pool.stats(),
            PoolStats {
                completed: 1,
                failed: 0,
                panicked: 1
            }
        );
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let pool = WorkerPool::new(2).unwrap();
        pool.shutdown().await;
        pool.shutdown().await;
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }
}
