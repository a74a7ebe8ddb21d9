//! `job_pool`: a mapping from priority to FIFO queue of jobs, plus a
//! set of named notification listeners (spec §4.2). Guarded by one
//! mutex covering both the bucket map and the listener list — spec §5
//! calls this out explicitly as a single monitor.

use super::{Job, Priority};
use crate::error::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

/// A listener fires whenever a job is pushed at (or a `stop`/drain
/// reaches zero for) the priorities it cares about. The pool doesn't
/// interpret the callback's argument beyond passing the priority that
/// triggered it, or `None` for the "pool emptied" notification.
type Listener = Box<dyn Fn(Option<Priority>) + Send>;

struct Inner {
    buckets: HashMap<Priority, VecDeque<Job>>,
    listeners: HashMap<String, Listener>,
    draining: bool,
}

impl Inner {
    fn total(&self) -> usize {
        self.buckets.values().map(VecDeque::len).sum()
    }
}

/// Shared, thread-safe job pool. Cloning a `JobPool` clones the handle,
/// not the contents — all clones see the same buckets.
#[derive(Clone)]
pub struct JobPool {
    inner: Arc<Mutex<Inner>>,
    condvar: Arc<Condvar>,
}

impl Default for JobPool {
    fn default() -> Self {
        JobPool::new()
    }
}

impl JobPool {
    pub fn new() -> Self {
        JobPool {
            inner: Arc::new(Mutex::new(Inner {
                buckets: Priority::ALL.iter().map(|p| (*p, VecDeque::new())).collect(),
                listeners: HashMap::new(),
                draining: false,
            })),
            condvar: Arc::new(Condvar::new()),
        }
    }

    /// Appends `job` to its priority bucket and wakes all waiters.
    /// Fails with `PoolLocked` while the pool is draining.
    pub fn push(&self, job: Job) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.draining {
            return Err(Error::PoolLocked);
        }
        let priority = job.priority;
        inner.buckets.entry(priority).or_default().push_back(job);
        self.notify(&inner, Some(priority));
        self.condvar.notify_all();
        Ok(())
    }

    /// Returns the head of bucket `primary` if non-empty, else the head
    /// of the first non-empty bucket in `others`, else `None`. Fires a
    /// "none" notification when the pop drains the pool to zero.
    pub fn pop(&self, primary: Priority, others: &[Priority]) -> Option<Job> {
        let mut inner = self.inner.lock().unwrap();
        let job = Self::pop_locked(&mut inner, primary, others);
        if job.is_some() && inner.total() == 0 {
            self.notify(&inner, None);
        }
        job
    }

    fn pop_locked(inner: &mut Inner, primary: Priority, others: &[Priority]) -> Option<Job> {
        if let Some(job) = inner.buckets.get_mut(&primary).and_then(VecDeque::pop_front) {
            return Some(job);
        }
        for other in others {
            if let Some(job) = inner.buckets.get_mut(other).and_then(VecDeque::pop_front) {
                return Some(job);
            }
        }
        None
    }

    /// Non-destructive predicate counterpart of `pop`.
    pub fn contain(&self, primary: Priority, others: &[Priority]) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.buckets.get(&primary).is_some_and(|b| !b.is_empty())
            || others
                .iter()
                .any(|p| inner.buckets.get(p).is_some_and(|b| !b.is_empty()))
    }

    /// Blocks until (a) `stop_flag` becomes true, or (b) `contain(P,
    /// others)` becomes true. Used by `ThreadWorker`'s loop; never
    /// busy-waits (spec §4.2).
    pub fn wait_for_work(
        &self,
        primary: Priority,
        others: &[Priority],
        stop_flag: &Mutex<bool>,
    ) -> bool {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if *stop_flag.lock().unwrap() {
                return false;
            }
            if inner.buckets.get(&primary).is_some_and(|b| !b.is_empty())
                || others
                    .iter()
                    .any(|p| inner.buckets.get(p).is_some_and(|b| !b.is_empty()))
            {
                return true;
            }
            inner = self.condvar.wait(inner).unwrap();
        }
    }

    /// Wakes every waiter blocked in `wait_for_work` — used by
    /// `ThreadWorker::stop` since a stop flag flip alone wouldn't
    /// interrupt a condvar wait.
    pub fn wake_all(&self) {
        self.condvar.notify_all();
    }

    pub fn append_notification(&self, id: impl Into<String>, listener: Listener) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let id = id.into();
        if inner.listeners.contains_key(&id) {
            return Err(Error::InvalidArgument(format!(
                "notification id '{id}' already registered"
            )));
        }
        inner.listeners.insert(id, listener);
        Ok(())
    }

    pub fn remove_notification(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.listeners.remove(id);
    }

    fn notify(&self, inner: &Inner, priority: Option<Priority>) {
        for listener in inner.listeners.values() {
            listener(priority);
        }
    }

    /// Enters draining mode: further `push` calls fail with
    /// `PoolLocked`. Used by `ThreadPool::stop(.., drain_first=true)`.
    pub fn lock_for_draining(&self) {
        self.inner.lock().unwrap().draining = true;
    }

    pub fn total_len(&self) -> usize {
        self.inner.lock().unwrap().total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_preserves_fifo_within_bucket() {
        let pool = JobPool::new();
        for i in 0..3 {
            pool.push(Job::void(Priority::Normal, move || i >= 0)).unwrap();
        }
        assert!(pool.pop(Priority::Normal, &[]).is_some());
        assert!(pool.pop(Priority::Normal, &[]).is_some());
        assert!(pool.pop(Priority::Normal, &[]).is_some());
        assert!(pool.pop(Priority::Normal, &[]).is_none());
    }

    #[test]
    fn pop_falls_back_to_others_in_order() {
        let pool = JobPool::new();
        pool.push(Job::void(Priority::Low, || true)).unwrap();
        let job = pool.pop(Priority::Top, &[Priority::High, Priority::Low]);
        assert!(job.is_some());
    }

    #[test]
    fn push_fails_while_draining() {
        let pool = JobPool::new();
        pool.lock_for_draining();
        let err = pool.push(Job::void(Priority::Top, || true)).unwrap_err();
        assert!(matches!(err, Error::PoolLocked));
    }

    #[test]
    fn contain_is_non_destructive() {
        let pool = JobPool::new();
        pool.push(Job::void(Priority::High, || true)).unwrap();
        assert!(pool.contain(Priority::High, &[]));
        assert!(pool.contain(Priority::High, &[]));
        assert_eq!(pool.total_len(), 1);
    }

    #[test]
    fn duplicate_notification_id_is_rejected() {
        let pool = JobPool::new();
        pool.append_notification("a", Box::new(|_| {})).unwrap();
        let err = pool.append_notification("a", Box::new(|_| {})).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
