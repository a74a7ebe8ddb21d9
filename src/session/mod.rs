//! Per-connection session state: the handshake state machine and the
//! framed-TCP receive loop built on top of it (spec §4.3).

pub mod handshake;
mod messaging_session;

pub use handshake::{ConnectionConfirm, ConnectionRequest, HandshakeState, SessionType};
pub use messaging_session::{MessagingSession, Outbound, SessionHandler};
