//! `message_queue` (spec §4.5): a bounded queue in FIFO or
//! priority-ordered mode, guarded by a mutex + condvar monitor — the bus
//! layer has no cooperative `await` any more than the job pool does
//! (spec §5).

use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::bus::message::Message;
use crate::error::{Error, Result};

/// Ordering mode for a [`MessageQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    Fifo,
    Priority,
}

/// A message plus a monotonic sequence number, used to break priority
/// ties in push order (oldest-first among equal priorities).
struct Ranked {
    seq: u64,
    message: Message,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.message.priority == other.message.priority && self.seq == other.seq
    }
}
impl Eq for Ranked {}
impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.message
            .priority
            .cmp(&other.message.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

enum Storage {
    Fifo(VecDeque<Message>),
    Priority(BinaryHeap<Ranked>),
}

struct Inner {
    storage: Storage,
    max_size: usize,
    drop_on_full: bool,
    stopped: bool,
    next_seq: u64,
}

impl Inner {
    fn len(&self) -> usize {
        match &self.storage {
            Storage::Fifo(d) => d.len(),
            Storage::Priority(h) => h.len(),
        }
    }
}

/// A bounded message queue (spec §4.5).
pub struct MessageQueue {
    inner: Mutex<Inner>,
    condvar: Condvar,
}

impl MessageQueue {
    pub fn new(mode: QueueMode, max_size: usize, drop_on_full: bool) -> MessageQueue {
        let storage = match mode {
            QueueMode::Fifo => Storage::Fifo(VecDeque::new()),
            QueueMode::Priority => Storage::Priority(BinaryHeap::new()),
        };
        MessageQueue {
            inner: Mutex::new(Inner {
                storage,
                max_size,
                drop_on_full,
                stopped: false,
                next_seq: 0,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Enqueues `message`. Fails with `QueueStopped` if stopped, else
    /// `QueueFull` if at capacity and either the queue is priority-mode
    /// (which never drops to make room) or `drop_on_full` is false; a
    /// full FIFO queue with `drop_on_full` set instead evicts its oldest
    /// entry and accepts the new one.
    pub fn enqueue(&self, message: Message) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.stopped {
            return Err(Error::QueueStopped);
        }
        if inner.len() >= inner.max_size {
            match &mut inner.storage {
                Storage::Fifo(d) if inner.drop_on_full => {
                    d.pop_front();
                }
                _ => return Err(Error::QueueFull),
            }
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        match &mut inner.storage {
            Storage::Fifo(d) => d.push_back(message),
            Storage::Priority(h) => h.push(Ranked { seq, message }),
        }
        self.condvar.notify_all();
        Ok(())
    }

    /// Blocks until a message is available, the queue is stopped
    /// (`QueueStopped`), or `timeout` elapses (`QueueEmpty`).
    pub fn dequeue(&self, timeout: Duration) -> Result<Message> {
        let mut inner = self.inner.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(msg) = Self::pop_locked(&mut inner) {
                return Ok(msg);
            }
            if inner.stopped {
                return Err(Error::QueueStopped);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::QueueEmpty);
            }
            let (guard, result) = self
                .condvar
                .wait_timeout(inner, deadline - now)
                .unwrap();
            inner = guard;
            if result.timed_out() && Self::peek_empty(&inner) && !inner.stopped {
                return Err(Error::QueueEmpty);
            }
        }
    }

    /// Non-blocking dequeue: returns `QueueEmpty` immediately rather
    /// than waiting. A stopped queue always yields `QueueStopped`, even
    /// once drained, per spec §5 ("stopped queues remain drainable via
    /// try_dequeue returning queue_stopped immediately").
    pub fn try_dequeue(&self) -> Result<Message> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(msg) = Self::pop_locked(&mut inner) {
            return Ok(msg);
        }
        if inner.stopped {
            return Err(Error::QueueStopped);
        }
        Err(Error::QueueEmpty)
    }

    fn pop_locked(inner: &mut Inner) -> Option<Message> {
        match &mut inner.storage {
            Storage::Fifo(d) => d.pop_front(),
            Storage::Priority(h) => h.pop().map(|r| r.message),
        }
    }

    fn peek_empty(inner: &Inner) -> bool {
        inner.len() == 0
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Marks the queue stopped and wakes every blocked `dequeue`.
    pub fn stop(&self) {
        self.inner.lock().unwrap().stopped = true;
        self.condvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().unwrap().stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::message::{MessagePriority, MessageType};

    fn msg(topic: &str, priority: MessagePriority) -> Message {
        Message::new(topic, MessageType::Event).with_priority(priority)
    }

    #[test]
    fn fifo_preserves_push_order() {
        let q = MessageQueue::new(QueueMode::Fifo, 10, false);
        q.enqueue(msg("a", MessagePriority::Normal)).unwrap();
        q.enqueue(msg("b", MessagePriority::Normal)).unwrap();
        assert_eq!(q.dequeue(Duration::from_millis(10)).unwrap().topic, "a");
        assert_eq!(q.dequeue(Duration::from_millis(10)).unwrap().topic, "b");
    }

    #[test]
    fn fifo_full_without_drop_on_full_rejects() {
        let q = MessageQueue::new(QueueMode::Fifo, 1, false);
        q.enqueue(msg("a", MessagePriority::Normal)).unwrap();
        let err = q.enqueue(msg("b", MessagePriority::Normal)).unwrap_err();
        assert!(matches!(err, Error::QueueFull));
    }

    #[test]
    fn fifo_full_with_drop_on_full_evicts_oldest() {
        let q = MessageQueue::new(QueueMode::Fifo, 1, true);
        q.enqueue(msg("a", MessagePriority::Normal)).unwrap();
        q.enqueue(msg("b", MessagePriority::Normal)).unwrap();
        assert_eq!(q.dequeue(Duration::from_millis(10)).unwrap().topic, "b");
    }

    #[test]
    fn priority_mode_never_drops_even_with_drop_on_full() {
        let q = MessageQueue::new(QueueMode::Priority, 1, true);
        q.enqueue(msg("a", MessagePriority::Low)).unwrap();
        let err = q.enqueue(msg("b", MessagePriority::High)).unwrap_err();
        assert!(matches!(err, Error::QueueFull));
    }

    #[test]
    fn priority_mode_dequeues_highest_first() {
        let q = MessageQueue::new(QueueMode::Priority, 10, false);
        q.enqueue(msg("low", MessagePriority::Low)).unwrap();
        q.enqueue(msg("critical", MessagePriority::Critical)).unwrap();
        q.enqueue(msg("normal", MessagePriority::Normal)).unwrap();
        assert_eq!(q.dequeue(Duration::from_millis(10)).unwrap().topic, "critical");
        assert_eq!(q.dequeue(Duration::from_millis(10)).unwrap().topic, "normal");
        assert_eq!(q.dequeue(Duration::from_millis(10)).unwrap().topic, "low");
    }

    #[test]
    fn dequeue_times_out_on_empty_queue() {
        let q = MessageQueue::new(QueueMode::Fifo, 10, false);
        let err = q.dequeue(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, Error::QueueEmpty));
    }

    #[test]
    fn stop_wakes_blocked_dequeue_with_queue_stopped() {
        let q = std::sync::Arc::new(MessageQueue::new(QueueMode::Fifo, 10, false));
        let q2 = q.clone();
        let handle = std::thread::spawn(move || q2.dequeue(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(20));
        q.stop();
        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, Error::QueueStopped));
    }

    #[test]
    fn try_dequeue_on_stopped_empty_queue_returns_queue_stopped() {
        let q = MessageQueue::new(QueueMode::Fifo, 10, false);
        q.stop();
        let err = q.try_dequeue().unwrap_err();
        assert!(matches!(err, Error::QueueStopped));
    }
}
