//! `thread_pool` (spec §4.2): owns a set of workers sharing one pool.

use super::{JobPool, ThreadWorker};
use std::time::{Duration, Instant};

/// A fleet of workers draining a shared [`JobPool`].
pub struct ThreadPool {
    pool: JobPool,
    workers: Vec<ThreadWorker>,
}

impl ThreadPool {
    pub fn new() -> Self {
        ThreadPool {
            pool: JobPool::new(),
            workers: Vec::new(),
        }
    }

    pub fn pool(&self) -> &JobPool {
        &self.pool
    }

    /// Wires `worker` to this pool's shared queue and, if `start` is
    /// true, starts it immediately.
    pub fn append(&mut self, mut worker: ThreadWorker, start: bool) {
        if start {
            worker.start(self.pool.clone());
        }
        self.workers.push(worker);
    }

    /// Starts every worker that isn't already running.
    pub fn start(&mut self) {
        for worker in &mut self.workers {
            worker.start(self.pool.clone());
        }
    }

    /// Stops the fleet. When `drain_first` is true, the pool is locked
    /// against further pushes and this call blocks (up to
    /// `shutdown_timeout`) until the pool's total job count reaches
    /// zero before stopping workers; otherwise workers are stopped
    /// immediately and any queued jobs are discarded.
    pub fn stop(&mut self, drain_first: bool, shutdown_timeout: Duration) {
        if drain_first {
            self.pool.lock_for_draining();
            let deadline = Instant::now() + shutdown_timeout;
            while self.pool.total_len() > 0 && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        for worker in &mut self.workers {
            worker.stop(&self.pool);
        }
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        ThreadPool::new()
    }
}
