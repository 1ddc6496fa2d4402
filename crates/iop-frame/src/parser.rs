//! Incremental frame parser.
//!
//! One parser lives for the lifetime of a connection. Bytes are fed in
//! whatever chunks the transport delivers; complete frames collect in a FIFO
//! queue. Unconsumed bytes (including half of a header integer) are kept
//! verbatim until the next [`FrameParser::feed`].
//!
//! A length outside the accepted range means the stream lost alignment. The
//! parser then discards input until it has seen [`SYNC_ZERO_BYTES`]
//! consecutive zero bytes, skips any further zeros, and resumes header parsing
//! at the first non-zero byte. Senders realign a peer by writing such a run.

use std::collections::VecDeque;

use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use crate::codec::Frame;
use crate::meta::meta_name;

/// Consecutive zero bytes required before the parser trusts the stream again.
pub const SYNC_ZERO_BYTES: usize = 32;

/// Smallest declared body length accepted as a frame.
///
/// Anything below is treated as stream corruption. Empty bodies are valid; set
/// [`ParserConfig::min_body_length`] to 1 to reject them as well.
pub const MIN_BODY_LENGTH: i32 = 0;

/// Largest declared body length accepted as a frame: 16 MiB.
pub const DEFAULT_MAX_BODY: usize = 16 * 1024 * 1024;

/// Initial capacity of the input buffer: 128 KiB.
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

const INT_SIZE: usize = 4;

/// Where the parser is in the frame grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Waiting for the 4-byte meta type.
    AwaitHeaderType,
    /// Waiting for the 4-byte body length.
    AwaitHeaderLength,
    /// Filling the body of the current frame.
    AwaitBody,
    /// Lost alignment; counting consecutive zero bytes.
    AwaitSync,
    /// Zero run seen; skipping zeros up to the next header.
    SyncUp,
}

/// Tunables for [`FrameParser`].
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Zero-run length that ends a resync. Default: [`SYNC_ZERO_BYTES`].
    pub sync_zero_bytes: usize,
    /// Declared lengths below this trigger a resync. Default: [`MIN_BODY_LENGTH`].
    pub min_body_length: i32,
    /// Declared lengths above this trigger a resync. Default: [`DEFAULT_MAX_BODY`].
    pub max_body_length: usize,
    /// Initial input buffer capacity. Default: [`DEFAULT_BUFFER_SIZE`].
    pub initial_capacity: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            sync_zero_bytes: SYNC_ZERO_BYTES,
            min_body_length: MIN_BODY_LENGTH,
            max_body_length: DEFAULT_MAX_BODY,
            initial_capacity: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Resumable byte-stream-to-frame decoder.
#[derive(Debug)]
pub struct FrameParser {
    buf: BytesMut,
    state: ParseState,
    meta_type: i32,
    body: BytesMut,
    body_len: usize,
    zero_run: usize,
    frames: VecDeque<Frame>,
    config: ParserConfig,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    /// Create a parser with default configuration.
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    /// Create a parser with explicit configuration.
    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(config.initial_capacity),
            state: ParseState::AwaitHeaderType,
            meta_type: 0,
            body: BytesMut::new(),
            body_len: 0,
            zero_run: 0,
            frames: VecDeque::new(),
            config,
        }
    }

    /// Append `bytes` to the stream and decode as far as possible.
    ///
    /// Returns `true` when at least one complete frame is waiting in the
    /// queue. A single call may queue several frames.
    pub fn feed(&mut self, bytes: &[u8]) -> bool {
        self.store(bytes);
        self.parse_buffer();
        !self.frames.is_empty()
    }

    /// Pop the oldest complete frame.
    pub fn poll_frame(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    /// Drain every complete frame in arrival order.
    pub fn drain(&mut self) -> impl Iterator<Item = Frame> + '_ {
        self.frames.drain(..)
    }

    /// Number of complete frames waiting in the queue.
    pub fn pending(&self) -> usize {
        self.frames.len()
    }

    /// Current decoder state.
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Bytes received but not yet consumed by the state machine.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Parser configuration.
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    fn store(&mut self, bytes: &[u8]) {
        let spare = self.buf.capacity() - self.buf.len();
        if spare < bytes.len() {
            let target = 2 * (self.buf.capacity() + bytes.len());
            self.buf.reserve(target - self.buf.len());
        }
        self.buf.extend_from_slice(bytes);
    }

    fn parse_buffer(&mut self) {
        while self.can_progress() {
            match self.state {
                ParseState::AwaitHeaderType => {
                    self.meta_type = self.buf.get_i32();
                    self.state = ParseState::AwaitHeaderLength;
                }
                ParseState::AwaitHeaderLength => {
                    let length = self.buf.get_i32();
                    self.begin_body(length);
                }
                ParseState::AwaitBody => self.fill_body(),
                ParseState::AwaitSync => self.scan_sync(),
                ParseState::SyncUp => self.clear_sync(),
            }
        }
    }

    fn can_progress(&self) -> bool {
        match self.state {
            ParseState::AwaitHeaderType | ParseState::AwaitHeaderLength => {
                self.buf.len() >= INT_SIZE
            }
            ParseState::AwaitBody | ParseState::AwaitSync | ParseState::SyncUp => {
                !self.buf.is_empty()
            }
        }
    }

    fn begin_body(&mut self, length: i32) {
        let accepted = usize::try_from(length)
            .ok()
            .filter(|len| length >= self.config.min_body_length && *len <= self.config.max_body_length);

        let Some(len) = accepted else {
            warn!(
                meta_type = meta_name(self.meta_type),
                length, "frame length out of range, waiting for resync"
            );
            self.zero_run = 0;
            self.state = ParseState::AwaitSync;
            return;
        };

        if len == 0 {
            self.emit(BytesMut::new());
            return;
        }

        self.body_len = len;
        self.state = ParseState::AwaitBody;
    }

    fn fill_body(&mut self) {
        if self.body.is_empty() && self.buf.len() >= self.body_len {
            // Whole body already buffered: hand it out without copying.
            let body = self.buf.split_to(self.body_len);
            self.emit(body);
            return;
        }

        let take = (self.body_len - self.body.len()).min(self.buf.len());
        if self.body.capacity() == 0 {
            self.body.reserve(self.body_len);
        }
        self.body.extend_from_slice(&self.buf[..take]);
        self.buf.advance(take);

        if self.body.len() == self.body_len {
            let body = std::mem::take(&mut self.body);
            self.emit(body);
        }
    }

    fn emit(&mut self, body: BytesMut) {
        let frame = Frame {
            meta_type: self.meta_type,
            body: body.freeze(),
        };
        trace!(
            meta_type = frame.meta_name(),
            length = frame.body.len(),
            "frame decoded"
        );
        self.frames.push_back(frame);
        self.body_len = 0;
        self.state = ParseState::AwaitHeaderType;
    }

    fn scan_sync(&mut self) {
        let threshold = self.config.sync_zero_bytes.max(1);
        let mut consumed = 0usize;
        let mut synced = false;

        for &byte in self.buf.iter() {
            consumed += 1;
            if byte == 0 {
                self.zero_run += 1;
            } else {
                self.zero_run = 0;
            }
            if self.zero_run >= threshold {
                synced = true;
                break;
            }
        }
        self.buf.advance(consumed);

        if synced {
            debug!(zero_bytes = threshold, "sync run found");
            self.zero_run = 0;
            self.state = ParseState::SyncUp;
        }
    }

    fn clear_sync(&mut self) {
        // The first non-zero byte starts the next header; leave it in place.
        match self.buf.iter().position(|&byte| byte != 0) {
            Some(skip) => {
                self.buf.advance(skip);
                debug!("stream resynchronized");
                self.state = ParseState::AwaitHeaderType;
            }
            None => self.buf.clear(),
        }
    }
}
