use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use iop_frame::{FrameConfig, FrameReader, ParserConfig};
use iop_transport::{IopListener, DEFAULT_CONNECT_TIMEOUT};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::adaptor::{ClientMessageAdaptor, SessionAdaptor, SessionEvent};
use crate::connection::drive;
use crate::dispatcher::Dispatcher;
use crate::envelope::{Envelope, MessageType};
use crate::error::Result;
use crate::session::{next_session_id, Session};

/// Client tuning.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound on establishing the TCP connection. Default: 5 seconds.
    pub connect_timeout: Duration,
    /// Silence after which the connection reports `Idle`. `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// Write timeout for requests.
    pub write_timeout: Option<Duration>,
    /// Largest body the session may send.
    pub max_body_size: usize,
    pub parser: ParserConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: None,
            write_timeout: None,
            max_body_size: iop_frame::DEFAULT_MAX_BODY,
            parser: ParserConfig::default(),
        }
    }
}

/// Connects to a gateway server.
#[derive(Debug, Clone)]
pub struct IopClient {
    config: ClientConfig,
    dispatcher: Dispatcher,
}

impl Default for IopClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IopClient {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            dispatcher: Dispatcher::client(),
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_session_adaptor(mut self, adaptor: Arc<dyn SessionAdaptor>) -> Self {
        self.dispatcher = self.dispatcher.with_session_adaptor(adaptor);
        self
    }

    pub fn with_message_adaptor(mut self, adaptor: Arc<dyn ClientMessageAdaptor>) -> Self {
        self.dispatcher = self.dispatcher.with_client_adaptor(adaptor);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open a connection and start its reader thread.
    ///
    /// Fails with `TransportError::ConnectTimeout` when the server does not
    /// answer within `connect_timeout`; nothing is left running in that case.
    pub fn connect(&self, addr: impl ToSocketAddrs) -> Result<ClientConnection> {
        let stream = IopListener::connect(addr, self.config.connect_timeout)?;
        let peer = stream.peer_addr();
        let read_half = stream.try_clone()?;

        let frame_config = FrameConfig {
            max_body_size: self.config.max_body_size,
            read_timeout: self.config.idle_timeout,
            write_timeout: self.config.write_timeout,
        };
        stream.set_write_timeout(frame_config.write_timeout)?;
        let mut reader =
            FrameReader::with_config_iop(read_half, frame_config.clone(), self.config.parser.clone())?;

        let id = next_session_id();
        let session = Session::with_config(id, peer, stream, frame_config);
        info!(session_id = id, peer = ?peer, "connected to iop server");
        self.dispatcher.notify(&session, SessionEvent::Created);

        let dispatcher = self.dispatcher.clone();
        let reader_session = Arc::clone(&session);
        let reader_thread = thread::Builder::new()
            .name(format!("iop-client-{id}"))
            .spawn(move || drive(&mut reader, &reader_session, &dispatcher))
            .map_err(iop_frame::FrameError::Io)?;

        Ok(ClientConnection {
            session,
            reader_thread: Some(reader_thread),
        })
    }
}

/// An open client connection. Dropping it closes the session.
#[derive(Debug)]
pub struct ClientConnection {
    session: Arc<Session>,
    reader_thread: Option<JoinHandle<()>>,
}

impl ClientConnection {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Send REQ_LOGIN with `payload` as its nested JSON. Returns the request id.
    ///
    /// The reply arrives asynchronously through
    /// [`ClientMessageAdaptor::rsp_req_login`]; the session counts as
    /// authenticated once it has been accepted.
    pub fn login<T: Serialize>(&self, payload: &T) -> Result<Uuid> {
        let envelope = Envelope::from_payload(MessageType::ReqLogin, payload)?;
        self.session.send_login(&envelope)?;
        Ok(envelope.request_id())
    }

    /// Send a single-part request. Returns its request id.
    pub fn request<T: Serialize>(&self, message_type: MessageType, payload: &T) -> Result<Uuid> {
        let envelope = Envelope::from_payload(message_type, payload)?;
        self.session.send_request(&envelope)?;
        Ok(envelope.request_id())
    }

    /// Send a heartbeat with a fresh id. Returns the id.
    pub fn heartbeat(&self) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.session.send_heartbeat(id)?;
        Ok(id)
    }

    /// Close the connection and wait for the reader thread to finish.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let closed = self.session.close();
        if let Some(handle) = self.reader_thread.take() {
            if handle.join().is_err() {
                debug!(session_id = self.session.id(), "reader thread panicked");
            }
        }
        closed
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
