//! A single framed-TCP session: handshake followed by a receive loop that
//! auto-echoes or dispatches decoded containers to a [`SessionHandler`]
//! (spec §4.3 "Auto-echo" and "Routing").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::Pipeline;
use crate::container::ValueContainer;
use crate::error::{Error, Result};
use crate::framing::pipeline::{decode_packet_frame, encode_packet, send_frame};
use crate::framing::{FrameReader, FrameTags, Mode};
use crate::session::handshake::{
    evaluate_request, ConnectionConfirm, ConnectionRequest, HandshakeState, SessionType,
};

/// Callbacks invoked as a session receives traffic. Implementors decide
/// how decoded containers are routed onward (to a bus, a user callback,
/// whatever the embedding application needs).
pub trait SessionHandler: Send + Sync {
    fn on_message(&self, session_id: &str, session_sub_id: &str, container: ValueContainer);
    fn on_disconnected(&self, session_id: &str, session_sub_id: &str);
}

/// One entry on a session's outbound channel: a typed packet, or a raw
/// byte payload to send as a `file`/`binary`-mode frame (spec §4.4's
/// `send`/`send_files`/`send_binary`).
pub enum Outbound {
    Packet(ValueContainer),
    File(Vec<u8>),
    Binary(Vec<u8>),
}

/// A confirmed session's identity and negotiated transport options.
pub struct MessagingSession {
    pub id: String,
    pub sub_id: String,
    pub session_type: SessionType,
    pub auto_echo: bool,
    pub tags: FrameTags,
    pub pipeline: Pipeline,
    state: Arc<Mutex<HandshakeState>>,
    last_activity: Arc<Mutex<Instant>>,
    stop_flag: Arc<AtomicBool>,
}

impl MessagingSession {
    /// Server side of the handshake (spec §4.3): read one `packet`-mode
    /// frame carrying a `request_connection`, evaluate it, and write back
    /// a `confirm_connection`.
    ///
    /// `over_session_limit` implements spec §4.3/§4.4's `session_limit_count`
    /// enforcement (scenario S6): a request that would otherwise be
    /// confirmed instead gets `accepted=true, kill_code=true` on the wire
    /// (so the client still learns it was handshake-valid, just refused
    /// for capacity) and this call returns `HandshakeRejected` so the
    /// caller does not register the session.
    pub async fn accept<S>(
        stream: &mut S,
        tags: FrameTags,
        assigned_id: impl Into<String>,
        assigned_sub_id: impl Into<String>,
        expected_key: &str,
        allowed_types: &[SessionType],
        auto_echo: bool,
        over_session_limit: bool,
    ) -> Result<(MessagingSession, ConnectionRequest)>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let reader = FrameReader::new(tags);
        let frame = reader.read_frame(stream).await?;
        if frame.mode != Mode::Packet {
            return Err(Error::HandshakeRejected);
        }
        let pipeline = Pipeline::new();
        let container = decode_packet_frame(&frame, &pipeline)?;
        let request = ConnectionRequest::from_container(&container)?;

        let state = evaluate_request(&request, expected_key, allowed_types);
        let over_limit = over_session_limit && state == HandshakeState::Confirmed;
        let assigned_id = assigned_id.into();
        let assigned_sub_id = assigned_sub_id.into();
        let confirm = ConnectionConfirm {
            accepted: state == HandshakeState::Confirmed,
            assigned_id: assigned_id.clone(),
            assigned_sub_id: assigned_sub_id.clone(),
            connection_key: request.connection_key.clone(),
            encryption_key_iv_base64: None,
            kill_code: state != HandshakeState::Confirmed || over_limit,
        };
        let confirm_container = confirm.to_container();
        let encoded = encode_packet(&confirm_container, &pipeline)?;
        send_frame(stream, tags, Mode::Packet, &encoded).await?;

        if state != HandshakeState::Confirmed || over_limit {
            return Err(Error::HandshakeRejected);
        }

        Ok((
            MessagingSession {
                id: assigned_id,
                sub_id: assigned_sub_id,
                session_type: request.session_type,
                auto_echo,
                tags,
                pipeline,
                state: Arc::new(Mutex::new(HandshakeState::Confirmed)),
                last_activity: Arc::new(Mutex::new(Instant::now())),
                stop_flag: Arc::new(AtomicBool::new(false)),
            },
            request,
        ))
    }

    /// Client side of the handshake: send a `request_connection`, wait
    /// for `confirm_connection`.
    pub async fn connect<S>(
        stream: &mut S,
        tags: FrameTags,
        request: ConnectionRequest,
    ) -> Result<MessagingSession>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let pipeline = Pipeline::new();
        let encoded = encode_packet(&request.to_container(), &pipeline)?;
        send_frame(stream, tags, Mode::Packet, &encoded).await?;

        let reader = FrameReader::new(tags);
        let frame = reader.read_frame(stream).await?;
        let container = decode_packet_frame(&frame, &pipeline)?;
        let confirm = ConnectionConfirm::from_container(&container);
        if !confirm.accepted || confirm.kill_code {
            return Err(Error::HandshakeRejected);
        }

        Ok(MessagingSession {
            id: confirm.assigned_id,
            sub_id: confirm.assigned_sub_id,
            session_type: request.session_type,
            auto_echo: false,
            tags,
            pipeline,
            state: Arc::new(Mutex::new(HandshakeState::Confirmed)),
            last_activity: Arc::new(Mutex::new(Instant::now())),
            stop_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn state(&self) -> HandshakeState {
        *self.state.lock()
    }

    pub fn mark_disconnected(&self) {
        *self.state.lock() = HandshakeState::Disconnected;
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity.lock().elapsed()
    }

    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    /// Sends one container as a `packet`-mode frame.
    pub async fn send<S>(&self, stream: &mut S, container: &ValueContainer) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let encoded = encode_packet(container, &self.pipeline)?;
        send_frame(stream, self.tags, Mode::Packet, &encoded).await
    }

    /// Sends raw bytes as a `file`- or `binary`-mode frame, running them
    /// through the negotiated pipeline first (spec §4.4 `send_files`/
    /// `send_binary`).
    pub async fn send_raw<S>(&self, stream: &mut S, mode: Mode, bytes: &[u8]) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let encoded = crate::framing::pipeline::encode_bytes(bytes, &self.pipeline)?;
        send_frame(stream, self.tags, mode, &encoded).await
    }

    /// Drives the receive loop for this session until `stop()` is called
    /// or the stream errors out. Auto-echoes `echo`-typed containers back
    /// to the peer when `auto_echo` is set; everything else is handed to
    /// `handler`.
    pub async fn run<S>(&self, stream: &mut S, handler: &dyn SessionHandler) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let reader = FrameReader::new(self.tags);
        while !self.should_stop() {
            let frame = match reader.read_frame(stream).await {
                Ok(frame) => frame,
                Err(_) => break,
            };
            self.touch();
            match frame.mode {
                Mode::Packet => {
                    let container = match decode_packet_frame(&frame, &self.pipeline) {
                        Ok(c) => c,
                        Err(e) => {
                            tracing::error!(error = %e, "dropping malformed session packet");
                            continue;
                        }
                    };
                    if self.auto_echo && container.message_type == "echo" {
                        let _ = self.send(stream, &container).await;
                    } else {
                        handler.on_message(&self.id, &self.sub_id, container);
                    }
                }
                Mode::File | Mode::Binary => {
                    let mut container = ValueContainer::new();
                    container.add_root(crate::value::Value::bytes("payload", frame.payload));
                    handler.on_message(&self.id, &self.sub_id, container);
                }
            }
        }
        self.mark_disconnected();
        handler.on_disconnected(&self.id, &self.sub_id);
        Ok(())
    }

    /// Split-stream counterpart of [`MessagingSession::run`]'s read half,
    /// for servers that need to read and write a connection from two
    /// concurrent tasks (one per half of `TcpStream::into_split`).
    pub async fn recv_loop<R>(&self, reader_half: &mut R, handler: &dyn SessionHandler)
    where
        R: AsyncRead + Unpin,
    {
        let reader = FrameReader::new(self.tags);
        while !self.should_stop() {
            let frame = match reader.read_frame(reader_half).await {
                Ok(frame) => frame,
                Err(_) => break,
            };
            self.touch();
            match frame.mode {
                Mode::Packet => match decode_packet_frame(&frame, &self.pipeline) {
                    Ok(container) => handler.on_message(&self.id, &self.sub_id, container),
                    Err(e) => tracing::error!(error = %e, "dropping malformed session packet"),
                },
                Mode::File | Mode::Binary => {
                    let mut container = ValueContainer::new();
                    container.add_root(crate::value::Value::bytes("payload", frame.payload));
                    handler.on_message(&self.id, &self.sub_id, container);
                }
            }
        }
        self.mark_disconnected();
        handler.on_disconnected(&self.id, &self.sub_id);
    }

    /// Write-half counterpart of [`MessagingSession::recv_loop`]: drains
    /// `outbox` onto `writer_half` until it closes or `stop()` is called.
    pub async fn send_loop<W>(
        &self,
        writer_half: &mut W,
        mut outbox: tokio::sync::mpsc::UnboundedReceiver<Outbound>,
    ) where
        W: AsyncWrite + Unpin,
    {
        while !self.should_stop() {
            let sent = match outbox.recv().await {
                Some(Outbound::Packet(container)) => self.send(writer_half, &container).await,
                Some(Outbound::File(bytes)) => self.send_raw(writer_half, Mode::File, &bytes).await,
                Some(Outbound::Binary(bytes)) => {
                    self.send_raw(writer_half, Mode::Binary, &bytes).await
                }
                None => break,
            };
            if sent.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingHandler {
        received: Mutex<Vec<String>>,
    }

    impl SessionHandler for RecordingHandler {
        fn on_message(&self, _id: &str, _sub_id: &str, container: ValueContainer) {
            self.received.lock().push(container.message_type.clone());
        }
        fn on_disconnected(&self, _id: &str, _sub_id: &str) {}
    }

    #[tokio::test]
    async fn handshake_with_matching_key_succeeds_both_sides() {
        let tags = FrameTags::default();
        let (mut client_stream, mut server_stream) = tokio::io::duplex(64 * 1024);

        let request = ConnectionRequest {
            source_id: "client-1".into(),
            source_sub_id: "0".into(),
            session_type: SessionType::MessageLine,
            compression_requested: false,
            encryption_requested: false,
            connection_key: "secret".into(),
            snipping_targets: vec![],
        };

        let server_task = tokio::spawn(async move {
            MessagingSession::accept(
                &mut server_stream,
                tags,
                "server",
                "0",
                "secret",
                &[SessionType::MessageLine],
                true,
                false,
            )
            .await
        });

        let client = MessagingSession::connect(&mut client_stream, tags, request)
            .await
            .unwrap();

        let (server_session, _req) = server_task.await.unwrap().unwrap();
        assert_eq!(server_session.state(), HandshakeState::Confirmed);
        assert_eq!(client.id, "server");
    }

    #[tokio::test]
    async fn wrong_key_is_rejected_on_both_sides() {
        let tags = FrameTags::default();
        let (mut client_stream, mut server_stream) = tokio::io::duplex(64 * 1024);

        let request = ConnectionRequest {
            source_id: "client-1".into(),
            source_sub_id: "0".into(),
            session_type: SessionType::MessageLine,
            compression_requested: false,
            encryption_requested: false,
            connection_key: "wrong".into(),
            snipping_targets: vec![],
        };

        let server_task = tokio::spawn(async move {
            MessagingSession::accept(
                &mut server_stream,
                tags,
                "server",
                "0",
                "secret",
                &[SessionType::MessageLine],
                true,
                false,
            )
            .await
        });

        let client_result = MessagingSession::connect(&mut client_stream, tags, request).await;
        assert!(client_result.is_err());
        assert!(server_task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn auto_echo_reflects_echo_typed_containers() {
        let tags = FrameTags::default();
        let (mut a, mut b) = tokio::io::duplex(64 * 1024);

        let session = MessagingSession {
            id: "s".into(),
            sub_id: "0".into(),
            session_type: SessionType::MessageLine,
            auto_echo: true,
            tags,
            pipeline: Pipeline::new(),
            state: Arc::new(Mutex::new(HandshakeState::Confirmed)),
            last_activity: Arc::new(Mutex::new(Instant::now())),
            stop_flag: Arc::new(AtomicBool::new(false)),
        };

        let handler = RecordingHandler {
            received: Mutex::new(Vec::new()),
        };

        let runner = tokio::spawn(async move {
            let _ = session.run(&mut b, &handler).await;
            handler.received.lock().clone()
        });

        let mut echo = ValueContainer::addressed("echo", "peer", "0", "", "");
        echo.add_root(crate::value::Value::string("ping", "hi"));
        let encoded = encode_packet(&echo, &Pipeline::new()).unwrap();
        send_frame(&mut a, tags, Mode::Packet, &encoded).await.unwrap();

        let reader = FrameReader::new(tags);
        let reply_frame = reader.read_frame(&mut a).await.unwrap();
        let reply = decode_packet_frame(&reply_frame, &Pipeline::new()).unwrap();
        assert_eq!(reply.message_type, "echo");

        drop(a);
        let _ = runner.await;
    }
}
