//! `request_reply_handler` (spec §4.5, scenario S4): correlates an
//! outbound request with its reply by `correlation_id`, bridging the
//! bus's callback-based subscription onto a single waitable promise.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::bus::message::{Message, MessagePriority};
use crate::bus::message_bus::MessageBus;
use crate::error::{Error, Result};

struct Pending {
    reply: Option<Message>,
}

struct Inner {
    pending: Mutex<HashMap<String, Pending>>,
    condvar: Condvar,
}

/// Subscribes to a reply topic and resolves pending requests by
/// `correlation_id` as replies arrive (spec §4.5 "Request/reply").
pub struct RequestReplyHandler {
    bus: Arc<MessageBus>,
    reply_topic: String,
    inner: Arc<Inner>,
    subscription_id: u64,
}

impl RequestReplyHandler {
    /// Subscribes `bus` to `reply_topic` (default `service.reply` per
    /// spec §4.5). Replies with an unknown `correlation_id` are dropped
    /// as orphans.
    pub fn new(bus: Arc<MessageBus>, reply_topic: impl Into<String>) -> RequestReplyHandler {
        let reply_topic = reply_topic.into();
        let inner = Arc::new(Inner {
            pending: Mutex::new(HashMap::new()),
            condvar: Condvar::new(),
        });
        let handler_inner = inner.clone();
        let subscription_id = bus.subscribe(
            reply_topic.clone(),
            MessagePriority::Highest,
            Box::new(move |message: &Message| {
                let mut pending = handler_inner.pending.lock().unwrap();
                if let Some(slot) = pending.get_mut(&message.correlation_id) {
                    slot.reply = Some(message.clone());
                    handler_inner.condvar.notify_all();
                }
                Ok(())
            }),
        );
        RequestReplyHandler {
            bus,
            reply_topic,
            inner,
            subscription_id,
        }
    }

    pub fn default_reply_topic() -> &'static str {
        "service.reply"
    }

    /// Sends `request` and blocks up to `timeout` for a correlated
    /// reply. Sets `correlation_id` (fresh) and `target` (the reply
    /// topic) on the outbound before publishing.
    pub fn request(&self, request: Message, timeout: Duration) -> Result<Message> {
        let correlation_id = Uuid::new_v4().to_string();
        {
            let mut pending = self.inner.pending.lock().unwrap();
            pending.insert(correlation_id.clone(), Pending { reply: None });
        }

        let outbound = request
            .with_correlation_id(correlation_id.clone())
            .with_target(self.reply_topic.clone());
        if let Err(e) = self.bus.publish(outbound) {
            self.inner.pending.lock().unwrap().remove(&correlation_id);
            return Err(e);
        }

        let mut pending = self.inner.pending.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(slot) = pending.get(&correlation_id) {
                if let Some(reply) = &slot.reply {
                    let reply = reply.clone();
                    pending.remove(&correlation_id);
                    return Ok(reply);
                }
            } else {
                return Err(Error::RequestTimeout);
            }
            let now = Instant::now();
            if now >= deadline {
                pending.remove(&correlation_id);
                return Err(Error::RequestTimeout);
            }
            let (guard, _) = self
                .inner
                .condvar
                .wait_timeout(pending, deadline - now)
                .unwrap();
            pending = guard;
        }
    }

    pub fn reply_topic(&self) -> &str {
        &self.reply_topic
    }
}

impl Drop for RequestReplyHandler {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.subscription_id);
    }
}
