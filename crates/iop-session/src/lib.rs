//! Sessions and protocol dispatch for the IOP gateway protocol.
//!
//! A frame body carries an [`Envelope`]: correlation ids, a business
//! [`MessageType`], multi-part counters and the nested payload. The
//! [`Dispatcher`] routes each decoded frame of a connection to the
//! application's adaptors and enforces the login gate; the [`Session`] is the
//! handle applications send through.
//!
//! [`IopServer`] and [`IopClient`] wire these onto TCP with one reader thread
//! per connection.

pub mod adaptor;
pub mod client;
mod connection;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod server;
pub mod session;

pub use adaptor::{
    ClientMessageAdaptor, LoginManager, RequestContext, ResponseContext, ServerMessageAdaptor,
    SessionAdaptor, SessionEvent,
};
pub use client::{ClientConfig, ClientConnection, IopClient};
pub use dispatcher::{Dispatcher, LoginReply, Role};
pub use envelope::{Envelope, MessageType, Payload};
pub use error::{AdaptorError, AdaptorResult, ProtocolError, Result, SessionError};
pub use server::{IopServer, ServerConfig, ServerHandle, DEFAULT_IDLE_TIMEOUT};
pub use session::{next_session_id, Attribute, Session, Transport, TransportShutdown};
