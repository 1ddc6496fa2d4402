use std::any::Any;
use std::collections::HashMap;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use iop_frame::{FrameConfig, FrameWriter, MetaType};
use iop_transport::{IopStream, ShutdownHandle};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::envelope::Envelope;
use crate::error::{Result, SessionError};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique session id.
pub fn next_session_id() -> u64 {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Value stored in a session's attribute map.
pub type Attribute = Arc<dyn Any + Send + Sync>;

/// Write half of a connection owned by a [`Session`].
pub trait Transport: Write + Send {
    /// Handle that tears the connection down from another thread, waking
    /// any read or write blocked on it.
    fn shutdown_handle(&self) -> Box<dyn TransportShutdown>;
}

/// Closes a connection independently of its write half.
pub trait TransportShutdown: Send + Sync {
    fn shutdown(&self) -> io::Result<()>;
}

impl Transport for IopStream {
    fn shutdown_handle(&self) -> Box<dyn TransportShutdown> {
        Box::new(IopStream::shutdown_handle(self))
    }
}

impl TransportShutdown for ShutdownHandle {
    fn shutdown(&self) -> io::Result<()> {
        ShutdownHandle::shutdown(self).map_err(|err| match err {
            iop_transport::TransportError::Io(io) => io,
            other => io::Error::other(other.to_string()),
        })
    }
}

/// Per-connection handle for sending frames and storing connection state.
///
/// Shared as `Arc<Session>` between the connection's reader thread and any
/// application thread. The send path and the attribute map are locked
/// independently; the authenticated flag is written only by the dispatcher.
/// The shutdown handle sits outside the send lock so `close` never waits
/// behind a write stuck on a peer that stopped reading.
pub struct Session {
    id: u64,
    peer_addr: Option<SocketAddr>,
    writer: Mutex<Option<FrameWriter<Box<dyn Transport>>>>,
    shutdown: Option<Box<dyn TransportShutdown>>,
    closed: AtomicBool,
    authenticated: AtomicBool,
    attributes: Mutex<HashMap<String, Attribute>>,
}

impl Session {
    /// Session writing to `transport` with default frame configuration.
    pub fn new(
        id: u64,
        peer_addr: Option<SocketAddr>,
        transport: impl Transport + 'static,
    ) -> Arc<Self> {
        Self::with_config(id, peer_addr, transport, FrameConfig::default())
    }

    /// Session writing to `transport` with explicit frame configuration.
    pub fn with_config(
        id: u64,
        peer_addr: Option<SocketAddr>,
        transport: impl Transport + 'static,
        config: FrameConfig,
    ) -> Arc<Self> {
        let shutdown = transport.shutdown_handle();
        let transport: Box<dyn Transport> = Box::new(transport);
        Arc::new(Self {
            id,
            peer_addr,
            writer: Mutex::new(Some(FrameWriter::with_config(transport, config))),
            shutdown: Some(shutdown),
            closed: AtomicBool::new(false),
            authenticated: AtomicBool::new(false),
            attributes: Mutex::new(HashMap::new()),
        })
    }

    /// Session with no transport attached. Every send fails.
    pub fn detached(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            peer_addr: None,
            writer: Mutex::new(None),
            shutdown: None,
            closed: AtomicBool::new(true),
            authenticated: AtomicBool::new(false),
            attributes: Mutex::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Whether a LOGIN exchange has succeeded on this connection.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub(crate) fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::Release);
    }

    /// True until [`close`](Self::close) runs.
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Send a REQUEST frame.
    pub fn send_request(&self, envelope: &Envelope) -> Result<()> {
        self.send(MetaType::Request, envelope)
    }

    /// Send a RESPONSE frame.
    pub fn send_response(&self, envelope: &Envelope) -> Result<()> {
        self.send(MetaType::Response, envelope)
    }

    /// Send a HEARTBEAT frame carrying only `request_id`.
    pub fn send_heartbeat(&self, request_id: Uuid) -> Result<()> {
        self.send(MetaType::Heartbeat, &Envelope::heartbeat(request_id))
    }

    /// Send a LOGIN frame (a client's REQ_LOGIN, or a server's reply).
    pub fn send_login(&self, envelope: &Envelope) -> Result<()> {
        self.send(MetaType::Login, envelope)
    }

    fn send(&self, meta: MetaType, envelope: &Envelope) -> Result<()> {
        let body = envelope.to_bytes()?;
        if !self.is_connected() {
            return Err(SessionError::InvalidState("session is closed"));
        }
        let mut guard = self.lock_writer()?;
        let writer = guard
            .as_mut()
            .ok_or(SessionError::InvalidState("session has no transport"))?;
        let sent = writer.send(meta, &body);
        drop(guard);
        if let Err(err) = sent {
            if err.is_timeout() {
                // Part of the frame may be on the wire; the peer cannot re-frame after it.
                warn!(session_id = self.id, meta_type = meta.name(), "write timed out, closing session");
                if let Err(close_err) = self.close() {
                    debug!(session_id = self.id, error = %close_err, "close after write timeout failed");
                }
            }
            return Err(err.into());
        }
        trace!(
            session_id = self.id,
            meta_type = meta.name(),
            request_id = %envelope.request_id(),
            length = body.len(),
            "frame sent"
        );
        Ok(())
    }

    /// Close the connection.
    ///
    /// Blocks until the transport has been shut down. A send blocked on the
    /// transport fails, then the writer is released. Closing a closed or
    /// detached session is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let shut = match &self.shutdown {
            Some(handle) => handle.shutdown(),
            None => Ok(()),
        };
        // Taken after the shutdown, which is what unblocks a stuck sender.
        drop(self.lock_writer()?.take());
        shut.map_err(iop_frame::FrameError::Io)?;
        debug!(session_id = self.id, peer = ?self.peer_addr, "session closed");
        Ok(())
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set_attribute(&self, key: impl Into<String>, value: Attribute) {
        self.lock_attributes().insert(key.into(), value);
    }

    pub fn attribute(&self, key: &str) -> Option<Attribute> {
        self.lock_attributes().get(key).cloned()
    }

    /// Typed lookup; `None` when missing or of another type.
    pub fn attribute_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.attribute(key).and_then(|value| value.downcast::<T>().ok())
    }

    pub fn remove_attribute(&self, key: &str) -> Option<Attribute> {
        self.lock_attributes().remove(key)
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, Option<FrameWriter<Box<dyn Transport>>>>> {
        self.writer
            .lock()
            .map_err(|_| SessionError::InvalidState("session send lock poisoned"))
    }

    fn lock_attributes(&self) -> MutexGuard<'_, HashMap<String, Attribute>> {
        // The map holds no invariants a panicking writer could break.
        self.attributes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("authenticated", &self.is_authenticated())
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{self, Write};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use iop_frame::{Frame, FrameParser};

    use super::{Transport, TransportShutdown};

    /// In-memory transport that records everything written to it.
    #[derive(Clone, Default)]
    pub(crate) struct CaptureTransport {
        pub(crate) bytes: Arc<Mutex<Vec<u8>>>,
        pub(crate) shutdowns: Arc<Mutex<usize>>,
        pub(crate) fail_writes: Arc<AtomicBool>,
    }

    impl CaptureTransport {
        /// Decode everything written so far.
        pub(crate) fn frames(&self) -> Vec<Frame> {
            let mut parser = FrameParser::new();
            parser.feed(&self.bytes.lock().unwrap());
            parser.drain().collect()
        }
    }

    impl Write for CaptureTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.bytes.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Transport for CaptureTransport {
        fn shutdown_handle(&self) -> Box<dyn TransportShutdown> {
            Box::new(CaptureShutdown(Arc::clone(&self.shutdowns)))
        }
    }

    struct CaptureShutdown(Arc<Mutex<usize>>);

    impl TransportShutdown for CaptureShutdown {
        fn shutdown(&self) -> io::Result<()> {
            *self.0.lock().unwrap() += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use iop_frame::meta::{HEARTBEAT, LOGIN, REQUEST, RESPONSE};

    use super::test_support::CaptureTransport;
    use super::*;
    use crate::envelope::MessageType;

    #[test]
    fn sends_use_matching_meta_types() {
        let transport = CaptureTransport::default();
        let session = Session::new(1, None, transport.clone());
        let request = Envelope::request(MessageType::QryAccount, "{}");

        session.send_request(&request).unwrap();
        session
            .send_response(&Envelope::response(
                request.request_id(),
                MessageType::RspQryAccount,
                "{}",
            ))
            .unwrap();
        session.send_heartbeat(request.request_id()).unwrap();
        session
            .send_login(&Envelope::request(MessageType::ReqLogin, "{}"))
            .unwrap();

        let metas: Vec<i32> = transport.frames().iter().map(|f| f.meta_type).collect();
        assert_eq!(metas, vec![REQUEST, RESPONSE, HEARTBEAT, LOGIN]);
    }

    #[test]
    fn heartbeat_carries_only_the_correlation_id() {
        let transport = CaptureTransport::default();
        let session = Session::new(1, None, transport.clone());
        let id = Uuid::new_v4();

        session.send_heartbeat(id).unwrap();

        let frames = transport.frames();
        let env = Envelope::from_bytes(&frames[0].body).unwrap();
        assert_eq!(env, Envelope::heartbeat(id));
    }

    #[test]
    fn detached_session_rejects_sends() {
        let session = Session::detached(9);
        let err = session.send_heartbeat(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        assert!(!session.is_connected());
        session.close().unwrap();
    }

    #[test]
    fn close_is_idempotent_and_detaches() {
        let transport = CaptureTransport::default();
        let session = Session::new(2, None, transport.clone());
        assert!(session.is_connected());

        session.close().unwrap();
        session.close().unwrap();

        assert_eq!(*transport.shutdowns.lock().unwrap(), 1);
        assert!(!session.is_connected());
        let err = session
            .send_request(&Envelope::request(MessageType::QryOrder, "{}"))
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
    }

    /// A connected pair whose server end is accepted and never read.
    fn stalled_peer() -> (IopStream, IopStream) {
        let listener = iop_transport::IopListener::bind("127.0.0.1:0").unwrap();
        let stream = iop_transport::IopListener::connect(
            listener.local_addr(),
            iop_transport::DEFAULT_CONNECT_TIMEOUT,
        )
        .unwrap();
        let peer = listener.accept().unwrap();
        (stream, peer)
    }

    #[test]
    fn close_interrupts_a_send_blocked_on_the_peer() {
        let (stream, _peer) = stalled_peer();
        let session = Session::new(7, None, stream);
        let body = "x".repeat(1024 * 1024);

        let sender = {
            let session = Arc::clone(&session);
            thread::spawn(move || loop {
                let env = Envelope::request(MessageType::QryOrder, body.clone());
                if let Err(err) = session.send_request(&env) {
                    return err;
                }
            })
        };
        thread::sleep(Duration::from_millis(500));

        let (tx, rx) = mpsc::channel();
        let closer = Arc::clone(&session);
        thread::spawn(move || tx.send(closer.close().is_ok()).unwrap());
        assert!(rx.recv_timeout(Duration::from_secs(3)).unwrap());

        let err = sender.join().unwrap();
        assert!(matches!(
            err,
            SessionError::Frame(_) | SessionError::InvalidState(_)
        ));
        assert!(!session.is_connected());
    }

    #[test]
    fn write_timeout_fails_the_send_and_closes() {
        let (stream, _peer) = stalled_peer();
        stream
            .set_write_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        let session = Session::new(8, None, stream);
        let body = "y".repeat(1024 * 1024);

        let (tx, rx) = mpsc::channel();
        let sending = Arc::clone(&session);
        thread::spawn(move || {
            let err = loop {
                let env = Envelope::request(MessageType::QryOrder, body.clone());
                if let Err(err) = sending.send_request(&env) {
                    break err;
                }
            };
            tx.send(err).unwrap();
        });

        let err = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(err.is_timeout(), "{err}");
        assert!(!session.is_connected());
    }

    #[test]
    fn write_failure_surfaces_as_frame_error() {
        let transport = CaptureTransport::default();
        transport.fail_writes.store(true, Ordering::SeqCst);
        let session = Session::new(3, None, transport);

        let err = session.send_heartbeat(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, SessionError::Frame(_)));
    }

    #[test]
    fn attributes_are_typed_and_removable() {
        let session = Session::detached(4);
        session.set_attribute("user", Arc::new(String::from("alice")));
        session.set_attribute("limit", Arc::new(10u32));

        assert_eq!(
            session.attribute_as::<String>("user").as_deref(),
            Some(&"alice".to_string())
        );
        assert_eq!(session.attribute_as::<u32>("limit").as_deref(), Some(&10));
        assert!(session.attribute_as::<u32>("user").is_none());

        assert!(session.remove_attribute("user").is_some());
        assert!(session.attribute("user").is_none());
        assert!(session.remove_attribute("user").is_none());
    }

    #[test]
    fn authentication_flag_starts_false() {
        let session = Session::detached(5);
        assert!(!session.is_authenticated());
        session.set_authenticated(true);
        assert!(session.is_authenticated());
    }

    #[test]
    fn concurrent_sends_never_interleave_frames() {
        let transport = CaptureTransport::default();
        let session = Session::new(6, None, transport.clone());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let session = Arc::clone(&session);
                thread::spawn(move || {
                    for i in 0..25 {
                        let env = Envelope::request(
                            MessageType::QryOrder,
                            format!("{{\"thread\":{t},\"seq\":{i}}}"),
                        );
                        session.send_request(&env).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let frames = transport.frames();
        assert_eq!(frames.len(), 100);
        for frame in frames {
            Envelope::from_bytes(&frame.body).unwrap();
        }
    }
}
