use crate::envelope::MessageType;

/// Failure reported by an application adaptor (login manager, message adaptor).
pub type AdaptorError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by adaptor callbacks.
pub type AdaptorResult<T = ()> = std::result::Result<T, AdaptorError>;

/// Frames that violate the protocol contract.
///
/// These are fatal for the offending message only; the connection owner
/// decides whether to close.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame header carries a meta type no dispatcher understands.
    #[error("unknown meta type 0x{0:08X}")]
    UnknownMetaType(i32),

    /// The envelope names a business message type outside the known set.
    #[error("unknown message type {0:?}")]
    UnknownMessageType(String),

    /// A REQUEST, RESPONSE or LOGIN envelope without a message type.
    #[error("{meta_type} envelope has no message type")]
    MissingMessageType { meta_type: &'static str },

    /// A known message type arrived in the wrong kind of frame.
    #[error("message type {message_type} is not valid in a {meta_type} frame")]
    UnexpectedMessageType {
        meta_type: &'static str,
        message_type: MessageType,
    },

    /// The frame is valid but this side of the connection never receives it.
    #[error("{meta_type} frames are not accepted by the {role} side")]
    WrongDirection {
        meta_type: &'static str,
        role: &'static str,
    },
}

/// Errors that can occur in session and dispatch operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] iop_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] iop_frame::FrameError),

    /// Envelope or nested payload failed to (de)serialize.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame body is not UTF-8 text.
    #[error("frame body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Envelope decoded but its fields break the envelope invariants.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Protocol violation.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A business frame arrived before the session logged in.
    #[error("{meta_type} frame rejected: session {session_id} is not authenticated")]
    AuthenticationPending {
        session_id: u64,
        meta_type: &'static str,
    },

    /// Operation not possible in the session's current state.
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),

    /// An application adaptor reported a failure.
    #[error("adaptor failed: {0}")]
    Adaptor(#[source] AdaptorError),
}

impl SessionError {
    /// True when the peer closed the connection.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, SessionError::Frame(iop_frame::FrameError::ConnectionClosed))
    }

    /// True for read timeouts, which the server reports as idle time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Frame(err) if err.is_timeout())
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
