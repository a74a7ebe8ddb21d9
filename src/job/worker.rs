//! `thread_worker` (spec §4.2): one OS thread per worker, parked on its
//! pool's condvar, woken only by a push notification or a stop request.

use super::{JobPool, Priority};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// A single worker thread bound to one pool, with a primary priority
/// and an ordered list of priorities it may steal from when idle.
pub struct ThreadWorker {
    id: String,
    primary: Priority,
    others: Vec<Priority>,
    stop_flag: Arc<Mutex<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadWorker {
    pub fn new(primary: Priority, others: Vec<Priority>) -> Self {
        ThreadWorker {
            id: format!("worker-{}", NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed)),
            primary,
            others,
            stop_flag: Arc::new(Mutex::new(false)),
            handle: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Registers this worker's notification listener on the pool and
    /// spawns its loop thread. A worker that is already running is left
    /// untouched.
    pub fn start(&mut self, pool: JobPool) {
        if self.handle.is_some() {
            return;
        }
        let pool_for_listener = pool.clone();
        let _ = pool.append_notification(
            self.id.clone(),
            Box::new(move |_priority| {
                pool_for_listener.wake_all();
            }),
        );

        let primary = self.primary;
        let others = self.others.clone();
        let stop_flag = self.stop_flag.clone();
        let worker_id = self.id.clone();

        self.handle = Some(std::thread::spawn(move || {
            loop {
                let has_work = pool.wait_for_work(primary, &others, &stop_flag);
                if !has_work {
                    break;
                }
                if let Some(job) = pool.pop(primary, &others) {
                    let priority = job.priority;
                    let ok = job.run();
                    if !ok {
                        tracing::warn!(worker = worker_id.as_str(), ?priority, "job failed");
                    }
                }
            }
        }));
    }

    /// Sets the stop flag, wakes the pool's condvar so the loop observes
    /// it, unregisters the notification listener, and joins the thread.
    pub fn stop(&mut self, pool: &JobPool) {
        *self.stop_flag.lock().unwrap() = true;
        pool.wake_all();
        pool.remove_notification(&self.id);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn worker_runs_pushed_jobs() {
        let pool = JobPool::new();
        let mut worker = ThreadWorker::new(Priority::Normal, vec![]);
        worker.start(pool.clone());

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        pool.push(Job::void(Priority::Normal, move || {
            ran_clone.store(true, Ordering::SeqCst);
            true
        }))
        .unwrap();

        for _ in 0..200 {
            if ran.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(ran.load(Ordering::SeqCst));
        worker.stop(&pool);
    }

    #[test]
    fn stop_joins_without_hanging() {
        let pool = JobPool::new();
        let mut worker = ThreadWorker::new(Priority::Low, vec![]);
        worker.start(pool.clone());
        worker.stop(&pool);
        assert!(!worker.is_running() || worker.handle.is_none());
    }
}
