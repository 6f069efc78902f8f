//! Bounded worker pool.
//!
//! A fixed set of threads pulls boxed tasks from a bounded
//! `crossbeam-channel` queue. The producer blocks in [`WorkerPool::submit`]
//! while the queue is full, which is what keeps a fast directory walk from
//! running ahead of slow hashing.
//!
//! Cancellation is cooperative. After [`WorkerPool::stop`] (or when the
//! shared [`CancelToken`] fires) workers finish the task in hand, then drain
//! the queue without running anything else. `stop` only affects its own
//! pool; the run-wide token is left alone. [`WorkerPool::join`] returns once
//! every accepted task has either run or been skipped.

pub mod budget;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::signal::CancelToken;

pub use budget::{FdBudget, FdPermit};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Errors from the worker pool.
#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    /// A worker thread could not be started.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The pool was stopped; the task was not queued.
    #[error("Worker pool stopped")]
    Stopped,
}

/// Pool sizing.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Worker threads (at least one)
    pub workers: usize,
    /// Queued tasks before `submit` blocks (at least one)
    pub queue_capacity: usize,
    /// Thread name prefix
    pub name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let workers = thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get);
        Self {
            workers,
            queue_capacity: workers * 4,
            name: "worker".to_string(),
        }
    }
}

impl PoolConfig {
    /// Config with `workers` threads and a queue four times as deep.
    #[must_use]
    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            queue_capacity: workers * 4,
            ..Self::default()
        }
    }

    /// Set the thread name prefix.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the queue depth.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

/// What happened to the tasks a pool accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Tasks that ran to completion
    pub completed: usize,
    /// Tasks dropped from the queue after a stop
    pub skipped: usize,
    /// Tasks that panicked
    pub panicked: usize,
}

impl PoolReport {
    /// Total tasks the pool accepted.
    #[must_use]
    pub fn accepted(&self) -> usize {
        self.completed + self.skipped + self.panicked
    }
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicUsize,
    skipped: AtomicUsize,
    panicked: AtomicUsize,
}

/// Fixed-size thread pool over a bounded queue.
pub struct WorkerPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    halt: Halt,
    counters: Arc<Counters>,
}

/// The run-wide token plus this pool's own stop flag.
#[derive(Debug, Clone)]
struct Halt {
    run: CancelToken,
    stopped: Arc<AtomicBool>,
}

impl Halt {
    fn is_set(&self) -> bool {
        self.stopped.load(Ordering::Acquire) || self.run.is_cancelled()
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("stopped", &self.halt.is_set())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Start the worker threads.
    ///
    /// # Errors
    ///
    /// [`PoolError::Spawn`] if a thread cannot be created; threads that did
    /// start are shut down before returning.
    pub fn new(config: &PoolConfig, cancel: CancelToken) -> Result<Self, PoolError> {
        let workers = config.workers.max(1);
        let (sender, receiver) = bounded::<Task>(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());

        let mut pool = Self {
            sender: Some(sender),
            workers: Vec::with_capacity(workers),
            halt: Halt {
                run: cancel,
                stopped: Arc::new(AtomicBool::new(false)),
            },
            counters,
        };

        for i in 0..workers {
            let receiver = receiver.clone();
            let halt = pool.halt.clone();
            let counters = Arc::clone(&pool.counters);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", config.name, i))
                .spawn(move || worker_loop(&receiver, &halt, &counters))
                .map_err(PoolError::Spawn)?;
            pool.workers.push(handle);
        }

        log::debug!(
            "Started {} pool: {} workers, queue {}",
            config.name,
            workers,
            config.queue_capacity.max(1)
        );
        Ok(pool)
    }

    /// Queue a task, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// [`PoolError::Stopped`] once the pool has been stopped.
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.halt.is_set() {
            return Err(PoolError::Stopped);
        }
        let sender = self.sender.as_ref().ok_or(PoolError::Stopped)?;
        sender.send(Box::new(task)).map_err(|_| PoolError::Stopped)
    }

    /// Stop starting new tasks. In-flight tasks finish normally.
    pub fn stop(&self) {
        self.halt.stopped.store(true, Ordering::Release);
    }

    /// Whether this pool was stopped or the run was cancelled.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.halt.is_set()
    }

    /// Close the queue and wait for every worker to exit.
    #[must_use = "the report says how many tasks were skipped or panicked"]
    pub fn join(mut self) -> PoolReport {
        self.shutdown();
        PoolReport {
            completed: self.counters.completed.load(Ordering::SeqCst),
            skipped: self.counters.skipped.load(Ordering::SeqCst),
            panicked: self.counters.panicked.load(Ordering::SeqCst),
        }
    }

    fn shutdown(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Worker thread exited abnormally");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: &Receiver<Task>, halt: &Halt, counters: &Counters) {
    for task in receiver.iter() {
        if halt.is_set() {
            counters.skipped.fetch_add(1, Ordering::SeqCst);
            continue;
        }
        match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(()) => {
                counters.completed.fetch_add(1, Ordering::SeqCst);
            }
            Err(_) => {
                log::error!("Task panicked; worker continues");
                counters.panicked.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_join_after_all_tasks() {
        let pool = WorkerPool::new(&PoolConfig::with_workers(4), CancelToken::new()).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let done = Arc::clone(&done);
            pool.submit(move || {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        let report = pool.join();
        assert_eq!(done.load(Ordering::SeqCst), 100);
        assert_eq!(report.completed, 100);
        assert_eq!(report.accepted(), 100);
    }

    #[test]
    fn test_panic_does_not_kill_worker() {
        let pool = WorkerPool::new(&PoolConfig::with_workers(1), CancelToken::new()).unwrap();
        pool.submit(|| panic!("boom")).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        pool.submit(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let report = pool.join();
        assert_eq!(report.panicked, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_skips_queued_tasks() {
        let config = PoolConfig::with_workers(1).with_queue_capacity(16);
        let run = CancelToken::new();
        let pool = WorkerPool::new(&config, run.clone()).unwrap();

        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        pool.submit(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        })
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let ran = Arc::clone(&ran);
            pool.submit(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.stop();
        assert!(pool.is_stopped());
        assert!(matches!(pool.submit(|| {}), Err(PoolError::Stopped)));
        assert!(!run.is_cancelled());
        release_tx.send(()).unwrap();

        let report = pool.join();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(report.completed, 1);
        assert_eq!(report.skipped, 5);
    }

    #[test]
    fn test_shared_token_stops_pool() {
        let token = CancelToken::new();
        let pool = WorkerPool::new(&PoolConfig::with_workers(2), token.clone()).unwrap();
        token.cancel();
        assert!(pool.is_stopped());
        assert!(pool.submit(|| {}).is_err());
        assert_eq!(pool.join(), PoolReport::default());
    }

    #[test]
    fn test_stop_leaves_other_pools_running() {
        let run = CancelToken::new();
        let first = WorkerPool::new(&PoolConfig::with_workers(1), run.clone()).unwrap();
        let second = WorkerPool::new(&PoolConfig::with_workers(1), run.clone()).unwrap();
        first.stop();

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        second
            .submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(second.join().completed, 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(!run.is_cancelled());
        assert!(first.submit(|| {}).is_err());
        let _ = first.join();
    }

    #[test]
    fn test_config_minimums() {
        let config = PoolConfig::with_workers(0);
        assert_eq!(config.workers, 1);
        assert_eq!(config.queue_capacity, 4);
        assert_eq!(config.named("scan").name, "scan");
    }
}
