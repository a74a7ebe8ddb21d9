//! The bus-form message envelope (spec §4.5), grounded on the original
//! source's `message_metadata`/`message_priority`/`message_type`.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::container::ValueContainer;

/// Message priority, used both for dispatch ordering in
/// [`crate::bus::router::TopicRouter`] and for the bounded
/// [`crate::bus::queue::MessageQueue`]'s priority mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessagePriority {
    Lowest,
    Low,
    Normal,
    High,
    Highest,
    Critical,
}

impl Default for MessagePriority {
    fn default() -> Self {
        MessagePriority::Normal
    }
}

/// Message classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Command,
    Event,
    Query,
    Reply,
    Notification,
}

/// One bus message: routing metadata plus a typed [`ValueContainer`]
/// payload.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub topic: String,
    pub source: String,
    pub target: String,
    pub correlation_id: String,
    pub trace_id: String,
    pub message_type: MessageType,
    pub priority: MessagePriority,
    pub timestamp: SystemTime,
    pub ttl: Option<Duration>,
    pub headers: HashMap<String, String>,
    pub payload: ValueContainer,
}

impl Message {
    /// Builds a new message with a fresh id and `timestamp = now`,
    /// matching `message_builder`'s defaults.
    pub fn new(topic: impl Into<String>, message_type: MessageType) -> Message {
        Message {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            source: String::new(),
            target: String::new(),
            correlation_id: String::new(),
            trace_id: String::new(),
            message_type,
            priority: MessagePriority::default(),
            timestamp: SystemTime::now(),
            ttl: None,
            headers: HashMap::new(),
            payload: ValueContainer::new(),
        }
    }

    pub fn with_payload(mut self, payload: ValueContainer) -> Message {
        self.payload = payload;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Message {
        self.source = source.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Message {
        self.target = target.into();
        self
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Message {
        self.priority = priority;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Message {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Message {
        self.correlation_id = id.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Message {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// True once `timestamp + ttl` is in the past. Messages without a
    /// `ttl` never expire.
    pub fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => SystemTime::now()
                .duration_since(self.timestamp)
                .map(|age| age > ttl)
                .unwrap_or(false),
            None => false,
        }
    }

    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
    }
}
