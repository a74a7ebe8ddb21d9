//! The in-process message bus (spec §4.5): topic routing with wildcard
//! patterns, a bounded FIFO/priority queue, a worker fleet, request/reply
//! correlation, event streaming, and pub/sub convenience wrappers.

pub mod event_stream;
pub mod message;
pub mod message_bus;
pub mod pubsub;
pub mod queue;
pub mod request_reply;
pub mod router;

pub use event_stream::{EventBatchProcessor, EventStream};
pub use message::{Message, MessagePriority, MessageType};
pub use message_bus::{BusStatistics, MessageBus, MessageBusConfig};
pub use pubsub::{Publisher, Subscriber};
pub use queue::{MessageQueue, QueueMode};
pub use request_reply::RequestReplyHandler;
pub use router::{topic_matches, Handler, TopicRouter};
