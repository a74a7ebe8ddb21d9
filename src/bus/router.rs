//! `topic_router` (spec §4.5): `.`-segment topic matching with `*`
//! (exactly one segment) and `#` (zero or more trailing segments, final
//! position only).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::bus::message::{Message, MessagePriority};
use crate::error::Result;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// A handler invoked for topics matching its subscription's pattern.
pub type Handler = Box<dyn Fn(&Message) -> Result<()> + Send + Sync>;

struct Subscription {
    id: u64,
    pattern: String,
    priority: MessagePriority,
    handler: Handler,
}

/// Routes messages to pattern-subscribed handlers (spec §4.5).
///
/// Subscription lists are guarded by a reader-writer lock — many
/// concurrent matches, rare writes (spec §5 "Shared-resource policy").
#[derive(Default)]
pub struct TopicRouter {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl TopicRouter {
    pub fn new() -> TopicRouter {
        TopicRouter {
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    /// Registers `handler` under `pattern` at `priority`. Returns a
    /// subscription id usable with `unsubscribe`.
    pub fn subscribe(
        &self,
        pattern: impl Into<String>,
        priority: MessagePriority,
        handler: Handler,
    ) -> u64 {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.write().unwrap().push(Subscription {
            id,
            pattern: pattern.into(),
            priority,
            handler,
        });
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscriptions.write().unwrap().retain(|s| s.id != id);
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().unwrap().len()
    }

    /// Routes `message` to every matching subscription, highest priority
    /// first (stable across ties, i.e. subscribe order). A handler
    /// returning `Err` is logged and does not stop the remaining
    /// dispatch, but is not swallowed: once every matching handler has
    /// run, `route` returns `HandlerFailure` if any of them failed (spec
    /// §4.5/§7 — a handler failure must be observable by the caller so
    /// `message_bus` can count it and divert to the DLQ). Returns
    /// `NoSubscribers` if nothing matched.
    pub fn route(&self, message: &Message) -> Result<()> {
        let subscriptions = self.subscriptions.read().unwrap();
        let mut matched: Vec<&Subscription> = subscriptions
            .iter()
            .filter(|s| topic_matches(&s.pattern, &message.topic))
            .collect();
        if matched.is_empty() {
            return Err(crate::error::Error::NoSubscribers);
        }
        matched.sort_by(|a, b| b.priority.cmp(&a.priority));
        let mut failed = false;
        for sub in matched {
            if let Err(e) = (sub.handler)(message) {
                tracing::warn!(
                    topic = message.topic.as_str(),
                    pattern = sub.pattern.as_str(),
                    error = %e,
                    "subscriber handler failed"
                );
                failed = true;
            }
        }
        if failed {
            return Err(crate::error::Error::HandlerFailure(format!(
                "one or more subscribers failed for topic {}",
                message.topic
            )));
        }
        Ok(())
    }
}

/// Matches `topic` against `pattern` per spec §4.5's segment rules.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('.').collect();
    let topic_segments: Vec<&str> = topic.split('.').collect();
    match_segments(&pattern_segments, &topic_segments)
}

fn match_segments(pattern: &[&str], topic: &[&str]) -> bool {
    match pattern.first() {
        None => topic.is_empty(),
        // `#` only has its zero-or-more-trailing-segments meaning as the
        // final pattern segment (spec §4.5); elsewhere it can never match
        // (testable property 5: "any pattern with # not at the end does
        // not match").
        Some(&"#") => pattern.len() == 1,
        Some(&"*") => {
            !topic.is_empty() && match_segments(&pattern[1..], &topic[1..])
        }
        Some(seg) => {
            !topic.is_empty() && *seg == topic[0] && match_segments(&pattern[1..], &topic[1..])
        }
    }
}
