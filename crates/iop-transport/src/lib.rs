//! TCP transport for the IOP gateway protocol.
//!
//! This is the lowest layer of the workspace. It owns socket setup (bind,
//! accept, bounded connect) and hands out [`IopStream`] handles that the
//! framing layer reads from and writes to.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::{IopStream, ShutdownHandle};
pub use tcp::{IopListener, DEFAULT_CONNECT_TIMEOUT};
