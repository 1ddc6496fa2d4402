//! `tokio-util` codec adapter.
//!
//! `IopCodec` drives the same [`FrameParser`] as the blocking reader, so a
//! `Framed` stream gets identical fragmentation and resync behavior.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, Frame};
use crate::error::FrameError;
use crate::parser::{FrameParser, ParseState, ParserConfig};

/// Frame codec for `tokio_util::codec::Framed`.
#[derive(Debug)]
pub struct IopCodec {
    parser: FrameParser,
    max_body_size: usize,
}

impl Default for IopCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl IopCodec {
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    /// Codec whose encoder limit follows the parser's `max_body_length`.
    pub fn with_config(config: ParserConfig) -> Self {
        let max_body_size = config.max_body_length;
        Self {
            parser: FrameParser::with_config(config),
            max_body_size,
        }
    }

    /// Current state of the underlying parser.
    pub fn parse_state(&self) -> ParseState {
        self.parser.state()
    }
}

impl Decoder for IopCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.parser.poll_frame() {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }

        // The parser keeps partial input itself, so `src` is always drained.
        let input = src.split();
        self.parser.feed(&input);
        Ok(self.parser.poll_frame())
    }
}

impl Encoder<Frame> for IopCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.body.len() > self.max_body_size {
            return Err(FrameError::BodyTooLarge {
                size: item.body.len(),
                max: self.max_body_size,
            });
        }
        encode_frame(item.meta_type, &item.body, dst)
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, Bytes};
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::meta::{HEARTBEAT, REQUEST, RESPONSE};
    use crate::parser::SYNC_ZERO_BYTES;

    #[test]
    fn decode_drains_source_and_keeps_partial_frame() {
        let mut wire = BytesMut::new();
        encode_frame(REQUEST, b"partial", &mut wire).unwrap();
        let mut tail = wire.split_off(5);

        let mut codec = IopCodec::new();
        assert!(codec.decode(&mut wire).unwrap().is_none());
        assert!(wire.is_empty());

        let frame = codec.decode(&mut tail).unwrap().unwrap();
        assert_eq!(frame.body.as_ref(), b"partial");
    }

    #[test]
    fn decode_yields_batched_frames_one_by_one() {
        let mut wire = BytesMut::new();
        encode_frame(REQUEST, b"a", &mut wire).unwrap();
        encode_frame(RESPONSE, b"b", &mut wire).unwrap();

        let mut codec = IopCodec::new();
        let first = codec.decode(&mut wire).unwrap().unwrap();
        let second = codec.decode(&mut wire).unwrap().unwrap();
        assert_eq!(first.meta_type, REQUEST);
        assert_eq!(second.meta_type, RESPONSE);
        assert!(codec.decode(&mut wire).unwrap().is_none());
    }

    #[test]
    fn encoder_rejects_oversized_body() {
        let mut codec = IopCodec::with_config(ParserConfig {
            max_body_length: 2,
            ..ParserConfig::default()
        });
        let err = codec
            .encode(Frame::new(REQUEST, "too long"), &mut BytesMut::new())
            .unwrap_err();
        assert!(matches!(err, FrameError::BodyTooLarge { size: 8, .. }));
    }

    #[tokio::test]
    async fn framed_read_over_duplex_with_resync() {
        let (mut tx, rx) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            let mut wire = BytesMut::new();
            wire.put_i32(REQUEST);
            wire.put_i32(-1);
            wire.put_bytes(0, SYNC_ZERO_BYTES);
            encode_frame(HEARTBEAT, b"after", &mut wire).unwrap();
            encode_frame(REQUEST, b"next", &mut wire).unwrap();
            for chunk in wire.chunks(3) {
                tx.write_all(chunk).await.unwrap();
            }
        });

        let mut framed = FramedRead::new(rx, IopCodec::new());
        let first = framed.next().await.unwrap().unwrap();
        let second = framed.next().await.unwrap().unwrap();
        writer.await.unwrap();
        assert!(framed.next().await.is_none());

        assert_eq!((first.meta_type, first.body.as_ref()), (HEARTBEAT, b"after".as_ref()));
        assert_eq!((second.meta_type, second.body.as_ref()), (REQUEST, b"next".as_ref()));
    }

    #[tokio::test]
    async fn framed_write_then_read() {
        let (tx, rx) = tokio::io::duplex(1024);
        let mut sink = FramedWrite::new(tx, IopCodec::new());
        let mut stream = FramedRead::new(rx, IopCodec::new());

        sink.send(Frame::new(RESPONSE, Bytes::from_static(b"{}")))
            .await
            .unwrap();
        sink.send(Frame::new(HEARTBEAT, Bytes::new())).await.unwrap();
        drop(sink);

        let a = stream.next().await.unwrap().unwrap();
        let b = stream.next().await.unwrap().unwrap();
        assert_eq!(a.body.as_ref(), b"{}");
        assert_eq!(b.meta_type, HEARTBEAT);
        assert!(b.body.is_empty());
        assert!(stream.next().await.is_none());
    }
}
