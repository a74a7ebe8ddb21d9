//! `messaging_server` (spec §4.3): accepts framed TCP connections,
//! performs the handshake, registers confirmed sessions, and sweeps
//! expired ones on a recurring job posted to a [`crate::job::JobPool`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::container::ValueContainer;
use crate::error::{Error, Result};
use crate::framing::FrameTags;
use crate::job::{Job, JobPool, Priority};
use crate::session::{MessagingSession, Outbound, SessionHandler, SessionType};

/// Static server configuration (spec §4.3, §6).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub connection_key: String,
    pub allowed_types: Vec<SessionType>,
    pub auto_echo: bool,
    pub tags: FrameTags,
    /// How often the sweep job checks for expired sessions.
    pub sweep_interval: Duration,
    /// A session idle longer than this is considered expired (spec §4.3
    /// "after 1 second" default for the reference scenario).
    pub session_timeout: Duration,
    /// `session_limit_count` (spec §4.4, §6, scenario S6). A confirmed
    /// handshake arriving once the registry is at this size is answered
    /// with `kill_code=true` instead of being registered. `None` means
    /// unlimited.
    pub session_limit: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "127.0.0.1:0".into(),
            connection_key: String::new(),
            allowed_types: vec![
                SessionType::MessageLine,
                SessionType::FileLine,
                SessionType::BinaryLine,
            ],
            auto_echo: false,
            tags: FrameTags::default(),
            sweep_interval: Duration::from_millis(250),
            session_timeout: Duration::from_secs(1),
            session_limit: None,
        }
    }
}

struct RegisteredSession {
    session: Arc<MessagingSession>,
    outbox: mpsc::UnboundedSender<Outbound>,
}

type Registry = Arc<Mutex<HashMap<(String, String), RegisteredSession>>>;

/// Listens for framed TCP connections and fans confirmed sessions out to
/// a shared [`SessionHandler`].
pub struct MessagingServer {
    config: ServerConfig,
    job_pool: JobPool,
    registry: Registry,
    next_id: std::sync::atomic::AtomicU64,
    accept_task: Option<JoinHandle<()>>,
    sweep_task: Option<JoinHandle<()>>,
    stop_tx: Option<tokio::sync::watch::Sender<bool>>,
}

impl MessagingServer {
    pub fn new(config: ServerConfig, job_pool: JobPool) -> Self {
        MessagingServer {
            config,
            job_pool,
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_id: std::sync::atomic::AtomicU64::new(1),
            accept_task: None,
            sweep_task: None,
            stop_tx: None,
        }
    }

    /// Binds the listener and starts the accept loop plus the sweep
    /// loop. `handler` is shared across every accepted connection.
    pub async fn start(&mut self, handler: Arc<dyn SessionHandler>) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.config.bind_addr = listener.local_addr()?.to_string();

        let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
        self.stop_tx = Some(stop_tx);

        let config = self.config.clone();
        let registry = self.registry.clone();
        let next_id = Arc::new(std::sync::atomic::AtomicU64::new(1));
        let mut accept_stop_rx = stop_rx.clone();
        self.accept_task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_stop_rx.changed() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _addr)) = accepted else { break };
                        let config = config.clone();
                        let registry = registry.clone();
                        let handler = handler.clone();
                        let next_id = next_id.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                serve_connection(stream, config, registry, handler, next_id).await
                            {
                                tracing::warn!(error = %e, "connection terminated during handshake");
                            }
                        });
                    }
                }
            }
        }));

        let job_pool = self.job_pool.clone();
        let registry = self.registry.clone();
        let sweep_interval = self.config.sweep_interval;
        let session_timeout = self.config.session_timeout;
        self.sweep_task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(sweep_interval) => {
                        let registry = registry.clone();
                        let _ = job_pool.push(Job::void(Priority::Low, move || {
                            sweep_expired(&registry, session_timeout);
                            true
                        }));
                    }
                }
            }
        }));

        Ok(())
    }

    pub fn local_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn connected_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Sends `container` to every confirmed session.
    pub fn broadcast(&self, container: ValueContainer) {
        for reg in self.registry.lock().values() {
            let _ = reg.outbox.send(Outbound::Packet(container.clone()));
        }
    }

    /// Sends `container` to one session by id/sub_id.
    pub fn send(&self, id: &str, sub_id: &str, container: ValueContainer) -> Result<()> {
        let registry = self.registry.lock();
        let reg = registry
            .get(&(id.to_string(), sub_id.to_string()))
            .ok_or_else(|| Error::InvalidArgument(format!("no session {id}/{sub_id}")))?;
        reg.outbox
            .send(Outbound::Packet(container))
            .map_err(|_| Error::InvalidArgument("session outbox closed".into()))
    }

    pub fn disconnect(&self, id: &str, sub_id: &str) {
        if let Some(reg) = self
            .registry
            .lock()
            .remove(&(id.to_string(), sub_id.to_string()))
        {
            reg.session.request_stop();
        }
    }

    /// Stops accepting connections and aborts the accept/sweep tasks.
    /// Existing sessions are left to wind down on their own streams.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(true);
        }
        for reg in self.registry.lock().values() {
            reg.session.request_stop();
        }
    }
}

fn sweep_expired(registry: &Registry, timeout: Duration) {
    let mut registry = registry.lock();
    let expired: Vec<_> = registry
        .iter()
        .filter(|(_, reg)| reg.session.idle_for() > timeout)
        .map(|(key, _)| key.clone())
        .collect();
    for key in expired {
        if let Some(reg) = registry.remove(&key) {
            reg.session.request_stop();
            tracing::info!(id = key.0.as_str(), sub_id = key.1.as_str(), "swept expired session");
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    config: ServerConfig,
    registry: Registry,
    handler: Arc<dyn SessionHandler>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
) -> Result<()> {
    let assigned_sub_id = next_id
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
        .to_string();
    let over_limit = config
        .session_limit
        .is_some_and(|limit| registry.lock().len() >= limit);
    let (session, _request) = MessagingSession::accept(
        &mut stream,
        config.tags,
        "server",
        assigned_sub_id.clone(),
        &config.connection_key,
        &config.allowed_types,
        config.auto_echo,
        over_limit,
    )
    .await?;

    let session = Arc::new(session);
    let (tx, rx) = mpsc::unbounded_channel();
    registry.lock().insert(
        (session.id.clone(), session.sub_id.clone()),
        RegisteredSession {
            session: session.clone(),
            outbox: tx,
        },
    );

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

    let _ = recv_task.await;
    let _ = send_task.await;
    registry
        .lock()
        .remove(&(session.id.clone(), session.sub_id.clone()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::handshake::ConnectionRequest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        count: AtomicUsize,
    }

    impl SessionHandler for CountingHandler {
        fn on_message(&self, _id: &str, _sub_id: &str, _container: ValueContainer) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
        fn on_disconnected(&self, _id: &str, _sub_id: &str) {}
    }

    #[tokio::test]
    async fn accepts_and_registers_a_handshaking_client() {
        let mut config = ServerConfig::default();
        config.connection_key = "secret".into();
        let job_pool = JobPool::new();
        let mut server = MessagingServer::new(config, job_pool);
        let handler = Arc::new(CountingHandler {
            count: AtomicUsize::new(0),
        });
        server.start(handler).await.unwrap();

        let addr = server.local_addr().to_string();
        let mut client_stream = TcpStream::connect(&addr).await.unwrap();
        let request = ConnectionRequest {
            source_id: "client".into(),
            source_sub_id: "0".into(),
            session_type: SessionType::MessageLine,
            compression_requested: false,
            encryption_requested: false,
            connection_key: "secret".into(),
            snipping_targets: vec![],
        };
        let tags = FrameTags::default();
        let client_session = MessagingSession::connect(&mut client_stream, tags, request)
            .await
            .unwrap();
        assert_eq!(client_session.id, "server");

        for _ in 0..200 {
            if server.connected_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(server.connected_count(), 1);

        server.stop();
    }

    /// Scenario S6 from spec §8: a server with `session_limit_count=2`
    /// confirms the first two clients normally and kills the third.
    #[tokio::test]
    async fn session_limit_rejects_connections_past_capacity() {
        let mut config = ServerConfig::default();
        config.connection_key = "secret".into();
        config.session_limit = Some(2);
        let job_pool = JobPool::new();
        let mut server = MessagingServer::new(config, job_pool);
        let handler = Arc::new(CountingHandler {
            count: AtomicUsize::new(0),
        });
        server.start(handler).await.unwrap();
        let addr = server.local_addr().to_string();
        let tags = FrameTags::default();

        let connect = |addr: String| {
            let tags = tags;
            async move {
                let mut stream = TcpStream::connect(&addr).await.unwrap();
                let request = ConnectionRequest {
                    source_id: "client".into(),
                    source_sub_id: "0".into(),
                    session_type: SessionType::MessageLine,
                    compression_requested: false,
                    encryption_requested: false,
                    connection_key: "secret".into(),
                    snipping_targets: vec![],
                };
                MessagingSession::connect(&mut stream, tags, request).await
            }
        };

        let first = connect(addr.clone()).await;
        assert!(first.is_ok());
        for _ in 0..200 {
            if server.connected_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let second = connect(addr.clone()).await;
        assert!(second.is_ok());
        for _ in 0..200 {
            if server.connected_count() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(server.connected_count(), 2);

        let third = connect(addr).await;
        assert!(third.is_err());
        assert_eq!(server.connected_count(), 2);

        server.stop();
    }
}
