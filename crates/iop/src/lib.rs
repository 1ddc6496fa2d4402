//! Framing and session layer for the IOP trading gateway protocol.
//!
//! IOP carries JSON envelopes in length-prefixed frames over one persistent
//! TCP connection per client, with login, heartbeat, request and multi-part
//! response traffic multiplexed by a 4-byte meta type.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener and stream wrappers
//! - [`frame`]: wire codec, resumable parser with zero-run resync, blocking
//!   reader/writer, and a tokio-util codec behind the `async` feature
//! - [`session`]: envelopes, sessions, the protocol dispatcher, adaptor
//!   traits, and the threaded [`IopServer`](session::IopServer) /
//!   [`IopClient`](session::IopClient)

/// Re-export transport types.
pub mod transport {
    pub use iop_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use iop_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use iop_session::*;
}
