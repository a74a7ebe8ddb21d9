//! Error kinds shared across the crate.
//!
//! Every fallible public operation returns a tagged [`Error`] rather than
//! letting an exception escape the API boundary (spec §7). Internal glue
//! that never crosses a public boundary is free to use `anyhow::Result`,
//! matching the mix the teacher repo itself uses.

use thiserror::Error;

/// The crate-wide error type.
///
/// Variants map one-to-one onto the error kinds enumerated in spec §7.
/// These are kinds, not necessarily distinct failure causes — several
/// operations reuse the same variant for different underlying reasons,
/// which is intentional: callers match on the kind to decide retry /
/// log / drop policy, not on a per-call-site cause.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("queue is full")]
    QueueFull,

    #[error("queue is empty")]
    QueueEmpty,

    #[error("queue has been stopped")]
    QueueStopped,

    #[error("dequeue failed: {0}")]
    DequeueFailed(String),

    #[error("handshake rejected")]
    HandshakeRejected,

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("frame desynchronized, resyncing")]
    FrameDesync,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job pool is locked (draining)")]
    PoolLocked,

    #[error("request timed out")]
    RequestTimeout,

    #[error("no subscribers matched the topic")]
    NoSubscribers,

    #[error("handler failed: {0}")]
    HandlerFailure(String),

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("codec failure: {0}")]
    CodecFailure(String),
}

pub type Result<T> = std::result::Result<T, Error>;
