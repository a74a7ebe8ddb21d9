//! `event_stream` and `event_batch_processor` (spec.md §4.5 "Event
//! streaming", expanded per `original_source/patterns/event_streaming.h`):
//! a topic-scoped ring buffer for late-join replay, plus a batcher that
//! accumulates matching events until full or a timeout elapses.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::bus::message::{Message, MessagePriority};
use crate::bus::message_bus::MessageBus;
use crate::bus::router::topic_matches;

struct RingBuffer {
    events: Vec<Message>,
    capacity: usize,
}

impl RingBuffer {
    fn push(&mut self, message: Message) {
        if self.events.len() == self.capacity {
            self.events.remove(0);
        }
        self.events.push(message);
    }
}

/// A topic-pattern-scoped ring buffer of recent events, kept so a
/// late-joining subscriber can replay history instead of only seeing
/// what arrives after it subscribes.
pub struct EventStream {
    bus: Arc<MessageBus>,
    pattern: String,
    buffer: Arc<Mutex<RingBuffer>>,
    subscription_id: u64,
}

impl EventStream {
    /// Subscribes to `pattern` on `bus`, retaining up to `capacity`
    /// recent matching events. `replay_past_events` has no effect here
    /// beyond documenting intent — the buffer is always populated as
    /// events arrive; `replay`/`get_events` are what make history
    /// visible to a caller that joins late.
    pub fn new(bus: Arc<MessageBus>, pattern: impl Into<String>, capacity: usize) -> EventStream {
        let pattern = pattern.into();
        let buffer = Arc::new(Mutex::new(RingBuffer {
            events: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }));
        let buffer_for_handler = buffer.clone();
        let subscription_id = bus.subscribe(
            pattern.clone(),
            MessagePriority::Normal,
            Box::new(move |message: &Message| {
                buffer_for_handler.lock().unwrap().push(message.clone());
                Ok(())
            }),
        );
        EventStream {
            bus,
            pattern,
            buffer,
            subscription_id,
        }
    }

    /// Replays buffered events matching `replay_pattern` (typically the
    /// stream's own pattern, or a narrower one) to `callback`, oldest
    /// first.
    pub fn replay(&self, replay_pattern: &str, mut callback: impl FnMut(&Message)) {
        for event in self.get_events() {
            if topic_matches(replay_pattern, &event.topic) {
                callback(&event);
            }
        }
    }

    pub fn get_events(&self) -> Vec<Message> {
        self.buffer.lock().unwrap().events.clone()
    }

    pub fn event_count(&self) -> usize {
        self.buffer.lock().unwrap().events.len()
    }

    pub fn clear_buffer(&self) {
        self.buffer.lock().unwrap().events.clear();
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.subscription_id);
    }
}

struct BatchState {
    events: Vec<Message>,
    deadline: Option<Instant>,
}

/// Accumulates events matching a pattern until `batch_size` is reached
/// or `batch_timeout` elapses since the first buffered event, then
/// invokes the batch callback with the accumulated events (spec §4.5
/// "event_batch_processor").
pub struct EventBatchProcessor {
    bus: Arc<MessageBus>,
    subscription_id: u64,
    state: Arc<(Mutex<BatchState>, Condvar)>,
    flusher: Option<std::thread::JoinHandle<()>>,
    stop: Arc<std::sync::atomic::AtomicBool>,
}

impl EventBatchProcessor {
    pub fn new(
        bus: Arc<MessageBus>,
        pattern: impl Into<String>,
        batch_size: usize,
        batch_timeout: Duration,
        on_batch: impl Fn(Vec<Message>) + Send + Sync + 'static,
    ) -> EventBatchProcessor {
        let state = Arc::new((
            Mutex::new(BatchState {
                events: Vec::new(),
                deadline: None,
            }),
            Condvar::new(),
        ));
        let on_batch = Arc::new(on_batch);
        let state_for_handler = state.clone();
        let batch_size = batch_size.max(1);
        let subscription_id = bus.subscribe(
            pattern,
            MessagePriority::Normal,
            Box::new(move |message: &Message| {
                let (lock, cvar) = &*state_for_handler;
                let mut batch = lock.lock().unwrap();
                if batch.events.is_empty() {
                    batch.deadline = Some(Instant::now() + batch_timeout);
                }
                batch.events.push(message.clone());
                if batch.events.len() >= batch_size {
                    cvar.notify_all();
                }
                Ok(())
            }),
        );

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flusher_state = state.clone();
        let flusher_stop = stop.clone();
        let flusher_batch = on_batch.clone();
        let flusher = std::thread::spawn(move || {
            let (lock, cvar) = &*flusher_state;
            let mut batch = lock.lock().unwrap();
            loop {
                if flusher_stop.load(std::sync::atomic::Ordering::Relaxed) {
                    if !batch.events.is_empty() {
                        let drained = std::mem::take(&mut batch.events);
                        batch.deadline = None;
                        drop(batch);
                        flusher_batch(drained);
                    }
                    return;
                }
                let should_flush = batch.events.len() >= batch_size
                    || batch.deadline.is_some_and(|d| Instant::now() >= d);
                if should_flush && !batch.events.is_empty() {
                    let drained = std::mem::take(&mut batch.events);
                    batch.deadline = None;
                    drop(batch);
                    flusher_batch(drained);
                    batch = lock.lock().unwrap();
                    continue;
                }
                let wait_for = batch
                    .deadline
                    .map(|d| d.saturating_duration_since(Instant::now()))
                    .unwrap_or(Duration::from_millis(100));
                let (guard, _) = cvar
                    .wait_timeout(batch, wait_for.min(Duration::from_millis(100)).max(Duration::from_millis(1)))
                    .unwrap();
                batch = guard;
            }
        });

        EventBatchProcessor {
            bus,
            subscription_id,
            state,
            flusher: Some(flusher),
            stop,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.state.0.lock().unwrap().events.len()
    }
}

impl Drop for EventBatchProcessor {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.subscription_id);
        self.stop.store(true, std::sync::atomic::Ordering::Relaxed);
        self.state.1.notify_all();
        if let Some(flusher) = self.flusher.take() {
            let _ = flusher.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::message::MessageType;
    use crate::bus::message_bus::MessageBusConfig;

    #[test]
    fn event_stream_buffers_and_replays_matching_events() {
        let mut bus = MessageBus::new(MessageBusConfig::default());
        bus.start();
        let bus = Arc::new(bus);
        let stream = EventStream::new(bus.clone(), "orders.*", 10);

        bus.publish(Message::new("orders.created", MessageType::Event)).unwrap();
        bus.publish(Message::new("orders.shipped", MessageType::Event)).unwrap();
        for _ in 0..200 {
            if stream.event_count() == 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(stream.event_count(), 2);

        let mut replayed = Vec::new();
        stream.replay("orders.*", |m| replayed.push(m.topic.clone()));
        assert_eq!(replayed, vec!["orders.created", "orders.shipped"]);

        stream.clear_buffer();
        assert_eq!(stream.event_count(), 0);
    }

    #[test]
    fn ring_buffer_evicts_oldest_past_capacity() {
        let mut bus = MessageBus::new(MessageBusConfig::default());
        bus.start();
        let bus = Arc::new(bus);
        let stream = EventStream::new(bus.clone(), "x.*", 2);
        for i in 0..3 {
            bus.publish(Message::new(format!("x.{i}"), MessageType::Event)).unwrap();
        }
        for _ in 0..200 {
            if stream.event_count() == 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        let topics: Vec<_> = stream.get_events().into_iter().map(|m| m.topic).collect();
        assert_eq!(topics, vec!["x.1", "x.2"]);
    }

    #[test]
    fn batch_processor_flushes_on_size() {
        let mut bus = MessageBus::new(MessageBusConfig::default());
        bus.start();
        let bus = Arc::new(bus);
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = received.clone();
        let _processor = EventBatchProcessor::new(
            bus.clone(),
            "batch.*",
            3,
            Duration::from_secs(10),
            move |batch| r.lock().unwrap().push(batch.len()),
        );
        for i in 0..3 {
            bus.publish(Message::new(format!("batch.{i}"), MessageType::Event)).unwrap();
        }
        for _ in 0..300 {
            if !received.lock().unwrap().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(*received.lock().unwrap(), vec![3]);
    }

    #[test]
    fn batch_processor_flushes_on_timeout() {
        let mut bus = MessageBus::new(MessageBusConfig::default());
        bus.start();
        let bus = Arc::new(bus);
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = received.clone();
        let _processor = EventBatchProcessor::new(
            bus.clone(),
            "slow.*",
            100,
            Duration::from_millis(50),
            move |batch| r.lock().unwrap().push(batch.len()),
        );
        bus.publish(Message::new("slow.one", MessageType::Event)).unwrap();
        for _ in 0..300 {
            if !received.lock().unwrap().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(*received.lock().unwrap(), vec![1]);
    }
}
