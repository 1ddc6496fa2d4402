use std::io::{ErrorKind, Read};

use iop_transport::IopStream;

use crate::codec::{Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::parser::{FrameParser, ParseState, ParserConfig};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames. A
/// read timeout is returned as `FrameError::Io` and leaves the parser state
/// intact, so the next call resumes where the stream stopped.
pub struct FrameReader<T> {
    inner: T,
    parser: FrameParser,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default(), ParserConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig, parser_config: ParserConfig) -> Self {
        Self {
            inner,
            parser: FrameParser::with_config(parser_config),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(frame) = self.parser.poll_frame() {
                return Ok(frame);
            }

            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.parser.feed(&chunk[..read]);
        }
    }

    /// Current state of the underlying parser.
    pub fn parse_state(&self) -> ParseState {
        self.parser.state()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<IopStream> {
    /// Create a frame reader for `IopStream` and apply read timeout from config.
    pub fn with_config_iop(
        inner: IopStream,
        config: FrameConfig,
        parser_config: ParserConfig,
    ) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config, parser_config))
    }
}

pub(crate) fn transport_to_frame_error(err: iop_transport::TransportError) -> FrameError {
    match err {
        iop_transport::TransportError::Io(io) | iop_transport::TransportError::Accept(io) => {
            FrameError::Io(io)
        }
        iop_transport::TransportError::Bind { source, .. }
        | iop_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::encode_frame;
    use crate::meta::{HEARTBEAT, LOGIN, REQUEST, RESPONSE};
    use crate::parser::SYNC_ZERO_BYTES;

    #[test]
    fn read_single_frame() {
        let mut wire = BytesMut::new();
        encode_frame(REQUEST, b"hello", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.meta_type, REQUEST);
        assert_eq!(frame.body.as_ref(), b"hello");
    }

    #[test]
    fn read_multiple_frames() {
        let mut wire = BytesMut::new();
        encode_frame(REQUEST, b"one", &mut wire).unwrap();
        encode_frame(RESPONSE, b"two", &mut wire).unwrap();
        encode_frame(HEARTBEAT, b"three", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));

        let f1 = reader.read_frame().unwrap();
        let f2 = reader.read_frame().unwrap();
        let f3 = reader.read_frame().unwrap();

        assert_eq!((f1.meta_type, f1.body.as_ref()), (REQUEST, b"one".as_ref()));
        assert_eq!((f2.meta_type, f2.body.as_ref()), (RESPONSE, b"two".as_ref()));
        assert_eq!((f3.meta_type, f3.body.as_ref()), (HEARTBEAT, b"three".as_ref()));
    }

    #[test]
    fn read_frame_with_large_body() {
        let body = vec![0xAB; 64 * 1024];
        let mut wire = BytesMut::new();
        encode_frame(RESPONSE, &body, &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.body.as_ref(), body.as_slice());
    }

    #[test]
    fn partial_read_handling() {
        let mut wire = BytesMut::new();
        encode_frame(LOGIN, b"slow", &mut wire).unwrap();

        let byte_reader = ByteByByteReader {
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.meta_type, LOGIN);
        assert_eq!(frame.body.as_ref(), b"slow");
    }

    #[test]
    fn corrupt_stream_recovers_after_zero_run() {
        let mut wire = BytesMut::new();
        wire.put_i32(REQUEST);
        wire.put_i32(-1);
        wire.put_slice(b"garbage that used to be a body");
        wire.put_bytes(0, SYNC_ZERO_BYTES);
        encode_frame(REQUEST, b"recovered", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.body.as_ref(), b"recovered");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut partial = BytesMut::new();
        partial.put_i32(REQUEST);
        partial.put_i32(16);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert_eq!(reader.parse_state(), ParseState::AwaitBody);
    }

    #[test]
    fn timeout_then_resume_keeps_partial_frame() {
        let mut wire = BytesMut::new();
        encode_frame(REQUEST, b"resumed", &mut wire).unwrap();
        let bytes = wire.to_vec();

        let reader = TimeoutInTheMiddle {
            bytes,
            pos: 0,
            timed_out: false,
        };
        let mut framed = FrameReader::new(reader);

        let err = framed.read_frame().unwrap_err();
        assert!(err.is_timeout());

        let frame = framed.read_frame().unwrap();
        assert_eq!(frame.body.as_ref(), b"resumed");
    }

    #[test]
    fn interrupted_read_retries() {
        let mut wire = BytesMut::new();
        encode_frame(REQUEST, b"ok", &mut wire).unwrap();

        let reader = InterruptedThenData {
            state: 0,
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let frame = framed.read_frame().unwrap();

        assert_eq!(frame.body.as_ref(), b"ok");
    }

    #[test]
    fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut reader = FrameReader::new(cursor);

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        assert!(reader.config().read_timeout.is_none());
        let _inner = reader.into_inner();
    }

    #[test]
    fn applies_read_timeout_for_iop_stream() {
        let listener = iop_transport::IopListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();
        let _client =
            iop_transport::IopListener::connect(addr, iop_transport::DEFAULT_CONNECT_TIMEOUT)
                .unwrap();
        let stream = listener.accept().unwrap();

        let cfg = FrameConfig {
            read_timeout: Some(Duration::from_millis(10)),
            ..FrameConfig::default()
        };

        let mut reader =
            FrameReader::with_config_iop(stream, cfg, ParserConfig::default()).unwrap();
        let err = reader.read_frame().unwrap_err();
        assert!(err.is_timeout());
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct TimeoutInTheMiddle {
        bytes: Vec<u8>,
        pos: usize,
        timed_out: bool,
    }

    impl Read for TimeoutInTheMiddle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let half = self.bytes.len() / 2;
            if self.pos == half && !self.timed_out {
                self.timed_out = true;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            let end = if self.pos < half { half } else { self.bytes.len() };
            let n = (end - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
