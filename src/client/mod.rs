//! `messaging_client` (spec §4.3): connects to a `messaging_server`,
//! performs the client side of the handshake, and exposes `send`/`echo`
//! against the resulting session.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::container::ValueContainer;
use crate::error::Result;
use crate::framing::FrameTags;
use crate::session::handshake::ConnectionRequest;
use crate::session::{MessagingSession, Outbound, SessionHandler, SessionType};
use crate::value::Value;

/// Client-side connection options (spec §6's `request_connection`
/// fields).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    pub client_id: String,
    pub client_sub_id: String,
    pub session_type: SessionType,
    pub connection_key: String,
    pub compression_requested: bool,
    pub encryption_requested: bool,
    pub snipping_targets: Vec<String>,
    pub tags: FrameTags,
}

/// A connected client: owns the split TCP stream and forwards inbound
/// traffic to `handler` on a background task.
pub struct MessagingClient {
    session: Arc<MessagingSession>,
    outbox: mpsc::UnboundedSender<Outbound>,
    recv_task: tokio::task::JoinHandle<()>,
    send_task: tokio::task::JoinHandle<()>,
}

/// Widens the socket's send/recv buffers for the small, latency-sensitive
/// frames this protocol sends; Nagle's algorithm is already off via
/// `TcpStream::set_nodelay`. Best-effort: a platform that rejects one of
/// these options still gets a usable connection.
fn tune_socket(stream: &TcpStream) {
    let socket = socket2::SockRef::from(stream);
    let _ = socket.set_recv_buffer_size(64 * 1024);
    let _ = socket.set_send_buffer_size(64 * 1024);
}

impl MessagingClient {
    pub async fn connect(
        config: ClientConfig,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<MessagingClient> {
        let stream = TcpStream::connect(&config.server_addr).await?;
        stream.set_nodelay(true)?;
        tune_socket(&stream);
        let mut stream = stream;
        let request = ConnectionRequest {
            source_id: config.client_id.clone(),
            source_sub_id: config.client_sub_id.clone(),
            session_type: config.session_type,
            compression_requested: config.compression_requested,
            encryption_requested: config.encryption_requested,
            connection_key: config.connection_key.clone(),
            snipping_targets: config.snipping_targets.clone(),
        };
        let session = Arc::new(MessagingSession::connect(&mut stream, config.tags, request).await?);

        let (tx, rx) = mpsc::unbounded_channel();
        let (mut read_half, mut write_half) = stream.into_split();

        let recv_session = session.clone();
        let recv_handler = handler.clone();
        let recv_task = tokio::spawn(async move {
            recv_session.recv_loop(&mut read_half, recv_handler.as_ref()).await;
        });
        let send_session = session.clone();
        let send_task = tokio::spawn(async move {
            send_session.send_loop(&mut write_half, rx).await;
        });

        Ok(MessagingClient {
            session,
            outbox: tx,
            recv_task,
            send_task,
        })
    }

    pub fn id(&self) -> &str {
        &self.session.id
    }

    pub fn sub_id(&self) -> &str {
        &self.session.sub_id
    }

    /// Sends an arbitrary container to the server.
    pub fn send(&self, container: ValueContainer) -> Result<()> {
        self.outbox
            .send(Outbound::Packet(container))
            .map_err(|_| crate::error::Error::InvalidArgument("client outbox closed".into()))
    }

    /// Sends a raw byte payload as a `binary`-mode frame.
    pub fn send_binary(&self, data: Vec<u8>) -> Result<()> {
        self.outbox
            .send(Outbound::Binary(data))
            .map_err(|_| crate::error::Error::InvalidArgument("client outbox closed".into()))
    }

    /// Reads each path in `paths` and sends its bytes as a `file`-mode
    /// frame (spec §4.4 `send_files`). Files are sent one per frame, in
    /// the order given; a read failure for one path aborts the rest and
    /// returns its `io_error`.
    pub async fn send_files(&self, paths: &[impl AsRef<std::path::Path>]) -> Result<()> {
        for path in paths {
            let bytes = tokio::fs::read(path.as_ref()).await?;
            self.outbox
                .send(Outbound::File(bytes))
                .map_err(|_| crate::error::Error::InvalidArgument("client outbox closed".into()))?;
        }
        Ok(())
    }

    /// Round-trips a ping/pong container of `message_type = "echo"`
    /// through the server's auto-echo path (spec §4.3).
    pub fn echo(&self, text: impl AsRef<str>) -> Result<()> {
        let mut c = ValueContainer::addressed("echo", self.id(), self.sub_id(), "", "");
        c.add_root(Value::string("ping", text.as_ref()));
        self.send(c)
    }

    pub fn disconnect(&self) {
        self.session.request_stop();
        self.recv_task.abort();
        self.send_task.abort();
    }
}
