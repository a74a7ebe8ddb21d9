//! `message_bus` (spec §4.5): composes a queue, a topic router, an
//! optional dead-letter queue, and a worker fleet that drains the queue
//! into the router. Mirrors `job::thread_pool`'s fleet-management shape
//! one layer up, swapping raw closures for routed messages.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::bus::message::Message;
use crate::bus::queue::{MessageQueue, QueueMode};
use crate::bus::router::{Handler, TopicRouter};
use crate::bus::message::MessagePriority;
use crate::error::{Error, Result};

/// Static bus configuration (spec §4.5).
#[derive(Debug, Clone)]
pub struct MessageBusConfig {
    pub queue_mode: QueueMode,
    pub queue_max_size: usize,
    pub drop_on_full: bool,
    pub worker_threads: usize,
    pub dlq_enabled: bool,
    pub dlq_max_size: usize,
    /// How long a worker blocks on an empty queue before re-checking for
    /// a stop request. Not user-observable — just the wake granularity.
    pub poll_interval: Duration,
}

impl Default for MessageBusConfig {
    fn default() -> Self {
        MessageBusConfig {
            queue_mode: QueueMode::Fifo,
            queue_max_size: 1024,
            drop_on_full: false,
            worker_threads: 1,
            dlq_enabled: false,
            dlq_max_size: 256,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// A snapshot of the bus's running counters (spec.md §4.1 ADDED,
/// mirrored here for the bus per `kcenon::messaging::message_bus::
/// statistics_snapshot` in `original_source/`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStatistics {
    pub messages_published: u64,
    pub messages_processed: u64,
    pub messages_failed: u64,
    pub messages_dropped: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Composes `message_queue` + `topic_router` + optional DLQ + a worker
/// fleet (spec §4.5 "message_bus").
pub struct MessageBus {
    config: MessageBusConfig,
    queue: Arc<MessageQueue>,
    router: Arc<TopicRouter>,
    dlq: Option<Arc<MessageQueue>>,
    counters: Arc<Counters>,
    workers: Vec<JoinHandle<()>>,
}

impl MessageBus {
    pub fn new(config: MessageBusConfig) -> MessageBus {
        let queue = Arc::new(MessageQueue::new(
            config.queue_mode,
            config.queue_max_size,
            config.drop_on_full,
        ));
        let dlq = config
            .dlq_enabled
            .then(|| Arc::new(MessageQueue::new(QueueMode::Fifo, config.dlq_max_size, false)));
        MessageBus {
            config,
            queue,
            router: Arc::new(TopicRouter::new()),
            dlq,
            counters: Arc::new(Counters::default()),
            workers: Vec::new(),
        }
    }

    /// Registers `handler` under `pattern` (spec §4.5 `topic_router`).
    pub fn subscribe(&self, pattern: impl Into<String>, priority: MessagePriority, handler: Handler) -> u64 {
        self.router.subscribe(pattern, priority, handler)
    }

    pub fn unsubscribe(&self, id: u64) {
        self.router.unsubscribe(id);
    }

    /// Validates and enqueues `message` (spec §4.5 "publish validates the
    /// message (id present, topic non-empty, not expired)").
    pub fn publish(&self, message: Message) -> Result<()> {
        if message.id.is_empty() {
            return Err(Error::InvalidArgument("message id is empty".into()));
        }
        if message.topic.is_empty() {
            return Err(Error::InvalidArgument("message topic is empty".into()));
        }
        if message.is_expired() {
            return Err(Error::InvalidArgument("message already expired".into()));
        }
        self.queue.enqueue(message)?;
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Spawns `worker_threads` OS threads, each looping dequeue → route
    /// (spec §4.5 "worker fleet of `worker_threads` loops").
    pub fn start(&mut self) {
        for _ in 0..self.config.worker_threads.max(1) {
            let queue = self.queue.clone();
            let router = self.router.clone();
            let dlq = self.dlq.clone();
            let counters = self.counters.clone();
            let poll_interval = self.config.poll_interval;
            self.workers.push(std::thread::spawn(move || {
                worker_loop(&queue, &router, dlq.as_deref(), &counters, poll_interval);
            }));
        }
    }

    /// Stops accepting new dispatch. When `drain` is true, waits for the
    /// queue to empty before signaling workers to stop (spec §4.5
    /// "`stop` drains the queue if configured").
    pub fn stop(&mut self, drain: bool) {
        if drain {
            while !self.queue.is_empty() && !self.queue.is_stopped() {
                std::thread::sleep(Duration::from_millis(10));
            }
        }
        self.queue.stop();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }

    pub fn statistics(&self) -> BusStatistics {
        BusStatistics {
            messages_published: self.counters.published.load(Ordering::Relaxed),
            messages_processed: self.counters.processed.load(Ordering::Relaxed),
            messages_failed: self.counters.failed.load(Ordering::Relaxed),
            messages_dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// The dead-letter queue, when enabled (spec §4.5, §9 "DLQ").
    pub fn dead_letters(&self) -> Option<&Arc<MessageQueue>> {
        self.dlq.as_ref()
    }

    pub fn router(&self) -> &Arc<TopicRouter> {
        &self.router
    }
}

fn worker_loop(
    queue: &MessageQueue,
    router: &TopicRouter,
    dlq: Option<&MessageQueue>,
    counters: &Counters,
    poll_interval: Duration,
) {
    loop {
        match queue.dequeue(poll_interval) {
            Ok(message) => {
                counters.processed.fetch_add(1, Ordering::Relaxed);
                // `no_subscribers` is a soft error for the publisher (spec
                // §4.5): it does not count as a handler failure here.
                match router.route(&message) {
                    Ok(()) | Err(Error::NoSubscribers) => {}
                    Err(_) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        if let Some(dlq) = dlq {
                            if dlq.enqueue(message).is_err() {
                                counters.dropped.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                }
            }
            Err(Error::QueueEmpty) => continue,
            Err(Error::QueueStopped) => break,
            Err(_) => break,
        }
    }
}
