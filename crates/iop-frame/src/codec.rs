use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::meta::{meta_name, MetaType};
use crate::parser::DEFAULT_MAX_BODY;

/// Frame header: meta type (4) + length (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// A decoded (or to-be-encoded) frame.
///
/// The meta type is kept as the raw wire code: the parser does not judge it,
/// the dispatcher does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw meta type code.
    pub meta_type: i32,
    /// The frame body.
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(meta_type: impl Into<i32>, body: impl Into<Bytes>) -> Self {
        Self {
            meta_type: meta_type.into(),
            body: body.into(),
        }
    }

    /// Declared length of the body, as carried in the header.
    pub fn length(&self) -> i32 {
        // Frames only come from the parser or from `new`; both are bounded
        // well below i32::MAX in practice, and encoding rejects the rest.
        i32::try_from(self.body.len()).unwrap_or(i32::MAX)
    }

    /// Meta type, if the code is a known one.
    pub fn meta(&self) -> Option<MetaType> {
        MetaType::from_code(self.meta_type)
    }

    /// Name of the meta type for logs.
    pub fn meta_name(&self) -> &'static str {
        meta_name(self.meta_type)
    }

    /// The total wire size of this frame (header + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }

    /// Encode this frame into `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        encode_frame(self.meta_type, &self.body, dst)
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (all integers big-endian):
/// ```text
/// ┌──────────────┬──────────────┬──────────────────┐
/// │ MetaType     │ Length       │ Body             │
/// │ (4B i32 BE)  │ (4B i32 BE)  │ (Length bytes)   │
/// └──────────────┴──────────────┴──────────────────┘
/// ```
pub fn encode_frame(meta_type: impl Into<i32>, body: &[u8], dst: &mut BytesMut) -> Result<()> {
    let length = i32::try_from(body.len()).map_err(|_| FrameError::BodyTooLarge {
        size: body.len(),
        max: i32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + body.len());
    dst.put_i32(meta_type.into());
    dst.put_i32(length);
    dst.put_slice(body);
    Ok(())
}

/// Configuration for blocking frame I/O.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest body accepted for writing. Default: 16 MiB.
    pub max_body_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
