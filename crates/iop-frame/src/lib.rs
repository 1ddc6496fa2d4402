//! Length-prefixed framing for the IOP protocol.
//!
//! Every frame on the wire is:
//! - a 4-byte big-endian meta type (REQUEST, RESPONSE, HEARTBEAT, LOGIN)
//! - a 4-byte big-endian body length
//! - the body bytes
//!
//! Decoding goes through [`FrameParser`], a resumable state machine that
//! produces identical frames however the input is chunked and that
//! resynchronizes on a run of zero bytes after a corrupt length.

pub mod codec;
pub mod error;
pub mod meta;
pub mod parser;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod tokio_codec;

pub use codec::{encode_frame, Frame, FrameConfig, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use meta::MetaType;
pub use parser::{
    FrameParser, ParseState, ParserConfig, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_BODY,
    MIN_BODY_LENGTH, SYNC_ZERO_BYTES,
};
pub use reader::FrameReader;
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use tokio_codec::IopCodec;
