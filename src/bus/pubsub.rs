//! Thin convenience wrappers over `message_bus` (spec.md §4.5 ADDED,
//! grounded on the original source's `patterns/pub_sub.h`): a
//! `Publisher` that stamps a default source onto every message it
//! sends, and a `Subscriber` that tracks its own subscription ids and
//! unsubscribes all of them on drop.

use std::sync::Arc;

use crate::bus::message::{Message, MessagePriority};
use crate::bus::message_bus::MessageBus;
use crate::bus::router::Handler;
use crate::error::Result;

/// Publishes messages onto a bus, stamping a fixed `source` on each.
pub struct Publisher {
    bus: Arc<MessageBus>,
    source: String,
}

impl Publisher {
    pub fn new(bus: Arc<MessageBus>, source: impl Into<String>) -> Publisher {
        Publisher {
            bus,
            source: source.into(),
        }
    }

    pub fn publish(&self, message: Message) -> Result<()> {
        self.bus.publish(message.with_source(self.source.clone()))
    }
}

/// Subscribes to one or more topic patterns and unsubscribes all of
/// them when dropped, so a caller never has to remember to clean up.
pub struct Subscriber {
    bus: Arc<MessageBus>,
    subscription_ids: Vec<u64>,
}

impl Subscriber {
    pub fn new(bus: Arc<MessageBus>) -> Subscriber {
        Subscriber {
            bus,
            subscription_ids: Vec::new(),
        }
    }

    pub fn subscribe(
        &mut self,
        pattern: impl Into<String>,
        priority: MessagePriority,
        handler: Handler,
    ) -> u64 {
        let id = self.bus.subscribe(pattern, priority, handler);
        self.subscription_ids.push(id);
        id
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        for id in self.subscription_ids.drain(..) {
            self.bus.unsubscribe(id);
        }
    }
}
