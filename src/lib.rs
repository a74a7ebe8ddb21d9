//! `messaging_core`: typed structured-data containers, a priority job
//! pool, framed TCP sessions with pluggable compression/encryption, and
//! an in-process topic-routed message bus.
//!
//! - [`value`]/[`container`] — the typed value tree and its wire-format
//!   container (spec §3, §4.1).
//! - [`job`] — the priority-bucketed thread pool (spec §4.2).
//! - [`framing`]/[`codec`]/[`session`]/[`server`]/[`client`] — the
//!   framed TCP protocol, its codec pipeline, and the client/server
//!   lifecycles built on it (spec §4.3, §4.4).
//! - [`bus`] — the in-process publish/subscribe message bus, including
//!   request/reply and event streaming (spec §4.5).

pub mod bus;
pub mod client;
pub mod codec;
pub mod container;
pub mod error;
pub mod framing;
pub mod job;
pub mod logging;
pub mod server;
pub mod session;
pub mod value;

pub use container::ValueContainer;
pub use error::{Error, Result};
pub use value::{Value, ValueRef};

/// The crate's own version, as declared in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
