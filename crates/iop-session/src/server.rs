use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use iop_frame::{FrameConfig, FrameReader, ParserConfig};
use iop_transport::{IopListener, IopStream, DEFAULT_CONNECT_TIMEOUT};
use tracing::{debug, info, warn};

use crate::adaptor::{LoginManager, ServerMessageAdaptor, SessionAdaptor, SessionEvent};
use crate::connection::drive;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::session::{next_session_id, Session};

/// Default idle timeout: 30 minutes.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Server tuning.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Silence after which a connection reports `Idle`. The connection stays open.
    pub idle_timeout: Duration,
    /// Write timeout for replies.
    pub write_timeout: Option<Duration>,
    /// Largest body a session may send.
    pub max_body_size: usize,
    /// Frame parser tuning for every accepted connection.
    pub parser: ParserConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            write_timeout: None,
            max_body_size: iop_frame::DEFAULT_MAX_BODY,
            parser: ParserConfig::default(),
        }
    }
}

type SessionMap = Arc<Mutex<HashMap<u64, Arc<Session>>>>;

/// Accepts gateway connections and runs one reader thread per connection.
pub struct IopServer {
    listener: IopListener,
    config: ServerConfig,
    dispatcher: Dispatcher,
    sessions: SessionMap,
    running: Arc<AtomicBool>,
}

impl IopServer {
    /// Bind to a TCP address. Port 0 picks a free port.
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = IopListener::bind(addr)?;
        info!(addr = %listener.local_addr(), "iop server bound");
        Ok(Self {
            listener,
            config: ServerConfig::default(),
            dispatcher: Dispatcher::server(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_session_adaptor(mut self, adaptor: Arc<dyn SessionAdaptor>) -> Self {
        self.dispatcher = self.dispatcher.with_session_adaptor(adaptor);
        self
    }

    pub fn with_message_adaptor(mut self, adaptor: Arc<dyn ServerMessageAdaptor>) -> Self {
        self.dispatcher = self.dispatcher.with_server_adaptor(adaptor);
        self
    }

    pub fn with_login_manager(mut self, manager: Arc<dyn LoginManager>) -> Self {
        self.dispatcher = self.dispatcher.with_login_manager(manager);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handle for stopping [`serve`](Self::serve) from another thread.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            addr: self.local_addr(),
            running: Arc::clone(&self.running),
            sessions: Arc::clone(&self.sessions),
        }
    }

    /// Currently open sessions, e.g. for pushing market data.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        lock(&self.sessions).values().cloned().collect()
    }

    /// Accept connections until the server is shut down.
    pub fn serve(&self) -> Result<()> {
        while self.running.load(Ordering::Acquire) {
            let stream = match self.listener.accept() {
                Ok(stream) => stream,
                Err(err) if self.running.load(Ordering::Acquire) => {
                    warn!(error = %err, "accept failed");
                    continue;
                }
                Err(_) => break,
            };
            if !self.running.load(Ordering::Acquire) {
                break;
            }

            if let Err(err) = self.spawn_connection(stream) {
                warn!(error = %err, "failed to start connection");
            }
        }

        info!(addr = %self.local_addr(), "iop server stopped");
        Ok(())
    }

    fn spawn_connection(&self, stream: IopStream) -> Result<()> {
        let peer = stream.peer_addr();
        let read_half = stream.try_clone()?;
        let frame_config = FrameConfig {
            max_body_size: self.config.max_body_size,
            read_timeout: Some(self.config.idle_timeout),
            write_timeout: self.config.write_timeout,
        };
        stream.set_write_timeout(frame_config.write_timeout)?;
        let mut reader =
            FrameReader::with_config_iop(read_half, frame_config.clone(), self.config.parser.clone())?;

        let id = next_session_id();
        let session = Session::with_config(id, peer, stream, frame_config);
        {
            // Checked under the map lock: `shutdown` flips the flag before it
            // walks the map, so a session is either seen by it or closed here.
            let mut sessions = lock(&self.sessions);
            if !self.running.load(Ordering::Acquire) {
                drop(sessions);
                debug!(session_id = id, peer = ?peer, "connection accepted during shutdown, closing");
                return session.close();
            }
            sessions.insert(id, Arc::clone(&session));
        }
        debug!(session_id = id, peer = ?peer, "connection accepted");
        self.dispatcher.notify(&session, SessionEvent::Created);

        let dispatcher = self.dispatcher.clone();
        let sessions = Arc::clone(&self.sessions);
        thread::Builder::new()
            .name(format!("iop-session-{id}"))
            .spawn(move || {
                drive(&mut reader, &session, &dispatcher);
                lock(&sessions).remove(&session.id());
            })
            .map_err(iop_frame::FrameError::Io)?;
        Ok(())
    }
}

/// Stops a running [`IopServer`].
#[derive(Debug, Clone)]
pub struct ServerHandle {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    sessions: SessionMap,
}

impl ServerHandle {
    /// Stop accepting, close every open session, and wake the accept loop.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        for session in lock(&self.sessions).values() {
            if let Err(err) = session.close() {
                debug!(session_id = session.id(), error = %err, "close during shutdown failed");
            }
        }

        // The accept loop blocks; a throwaway connection lets it observe the flag.
        let wake = wake_addr(self.addr);
        if let Err(err) = IopListener::connect(wake, DEFAULT_CONNECT_TIMEOUT) {
            debug!(addr = %wake, error = %err, "shutdown wake connect failed");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

fn wake_addr(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V4(v4) if v4.ip().is_unspecified() => {
            SocketAddr::from(([127, 0, 0, 1], v4.port()))
        }
        SocketAddr::V6(v6) if v6.ip().is_unspecified() => {
            SocketAddr::from((std::net::Ipv6Addr::LOCALHOST, v6.port()))
        }
        other => other,
    }
}

fn lock(sessions: &SessionMap) -> MutexGuard<'_, HashMap<u64, Arc<Session>>> {
    sessions.lock().unwrap_or_else(PoisonError::into_inner)
}
