//! Length-prefixed JSON frames carried by the `/api/chat` response body.
//!
//! Every frame is a 4-byte big-endian payload length followed by the UTF-8
//! JSON encoding of a [`Frame`]. [`FrameCodec`] layers the JSON on top of
//! tokio-util's [`LengthDelimitedCodec`], whose defaults match that header.

use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder, FramedRead, LengthDelimitedCodec, LengthDelimitedCodecError};
use tokio_util::io::StreamReader;

use crate::error::{Error, Result};
use crate::protocol::CompletionChunk;

/// Size of the length prefix in bytes.
const HEADER_LEN: usize = 4;

/// Default upper bound for a single frame payload.
pub const DEFAULT_MAX_FRAME_LEN: usize = 8 * 1024 * 1024; // 8 MiB

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Frame {
    GenerationStart,
    GenerationChunk { chunk: CompletionChunk },
    GenerationError { error: String },
    GenerationFinish,
}

/// Encode a frame into its wire representation.
pub fn encode_frame(frame: &Frame) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    FrameCodec::new().encode(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode every frame of a chunked byte stream, such as a response body.
///
/// A stream that ends in the middle of a frame yields
/// [`Error::TruncatedFrame`] as its last item.
pub fn read_frames<S, B, E>(body: S) -> impl Stream<Item = Result<Frame>>
where
    S: Stream<Item = Result<B, E>>,
    B: Buf,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let reader = StreamReader::new(body.map(|chunk| chunk.map_err(std::io::Error::other)));
    FramedRead::new(reader, FrameCodec::new())
}

/// Codec for [`Frame`]s with a maximum payload size.
#[derive(Debug)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
    max_frame_len: usize,
    // Header consumed, payload still incomplete.
    in_frame: bool,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(HEADER_LEN)
                .max_frame_length(max_frame_len)
                .new_codec(),
            max_frame_len,
            in_frame: false,
        }
    }

    fn codec_error(&self, e: std::io::Error) -> Error {
        let too_large = e
            .get_ref()
            .is_some_and(|inner| inner.is::<LengthDelimitedCodecError>());
        if too_large {
            Error::FrameTooLarge {
                limit: self.max_frame_len,
            }
        } else {
            Error::Io(e)
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let buffered = src.len();
        match self.inner.decode(src) {
            Ok(Some(payload)) => {
                self.in_frame = false;
                Ok(Some(serde_json::from_slice(&payload)?))
            }
            Ok(None) => {
                self.in_frame |= buffered >= HEADER_LEN;
                Ok(None)
            }
            Err(e) => Err(self.codec_error(e)),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if self.in_frame || !src.is_empty() => Err(Error::TruncatedFrame),
            None => Ok(None),
        }
    }
}

impl<'a> Encoder<&'a Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: &'a Frame, dst: &mut BytesMut) -> Result<()> {
        let json = serde_json::to_vec(frame)?;
        self.inner
            .encode(Bytes::from(json), dst)
            .map_err(|e| self.codec_error(e))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::{ChunkChoice, ChunkDelta};

    fn text_chunk(text: &str) -> Frame {
        Frame::GenerationChunk {
            chunk: CompletionChunk {
                choices: vec![ChunkChoice {
                    index: 0,
                    delta: ChunkDelta {
                        content: Some(text.to_owned()),
                        ..Default::default()
                    },
                    finish_reason: None,
                }],
            },
        }
    }

    #[test]
    fn header_is_big_endian_payload_length() {
        let bytes = encode_frame(&Frame::GenerationStart).unwrap();
        let payload = br#"{"type":"generation-start"}"#;
        assert_eq!(&bytes[..4], &(payload.len() as u32).to_be_bytes());
        assert_eq!(&bytes[4..], payload);
    }

    #[test]
    fn decodes_frames_split_at_every_byte() {
        let frames = vec![
            Frame::GenerationStart,
            text_chunk("Sorted by price ✓"),
            Frame::GenerationFinish,
        ];
        let mut wire = Vec::new();
        for frame in &frames {
            wire.extend_from_slice(&encode_frame(frame).unwrap());
        }

        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for byte in &wire {
            buf.extend_from_slice(std::slice::from_ref(byte));
            while let Some(frame) = codec.decode(&mut buf).unwrap() {
                decoded.push(frame);
            }
        }

        assert_eq!(decoded, frames);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let bytes = encode_frame(&text_chunk("a long enough message")).unwrap();
        let mut codec = FrameCodec::with_max_frame_len(8);
        let mut buf = BytesMut::from(&bytes[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::FrameTooLarge { limit: 8 })
        ));
    }

    #[test]
    fn oversized_frame_is_not_encoded() {
        let mut codec = FrameCodec::with_max_frame_len(8);
        let mut buf = BytesMut::new();
        assert!(matches!(
            codec.encode(&text_chunk("a long enough message"), &mut buf),
            Err(Error::FrameTooLarge { limit: 8 })
        ));
    }

    #[test]
    fn truncated_stream_is_reported() {
        let bytes = encode_frame(&Frame::GenerationFinish).unwrap();
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&bytes[..bytes.len() - 1]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(matches!(codec.decode_eof(&mut buf), Err(Error::TruncatedFrame)));
    }

    #[test]
    fn stream_ending_right_after_a_header_is_truncated() {
        let bytes = encode_frame(&Frame::GenerationFinish).unwrap();
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&bytes[..HEADER_LEN]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(matches!(codec.decode_eof(&mut buf), Err(Error::TruncatedFrame)));
    }

    #[tokio::test]
    async fn read_frames_reassembles_chunked_body() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode_frame(&Frame::GenerationStart).unwrap());
        wire.extend_from_slice(&encode_frame(&text_chunk("hi")).unwrap());
        let chunks: Vec<std::io::Result<Bytes>> = wire
            .chunks(5)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        let frames: Vec<_> = read_frames(futures::stream::iter(chunks))
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert_eq!(frames, vec![Frame::GenerationStart, text_chunk("hi")]);
    }

    #[tokio::test]
    async fn read_frames_ends_with_truncation_error() {
        let bytes = encode_frame(&Frame::GenerationFinish).unwrap();
        let body = futures::stream::iter([Ok::<_, std::io::Error>(bytes.slice(..6))]);

        let results: Vec<_> = read_frames(body).collect().await;

        assert!(matches!(results.as_slice(), [Err(Error::TruncatedFrame)]));
    }

    #[test]
    fn error_frame_carries_message() {
        let bytes = encode_frame(&Frame::GenerationError {
            error: "rate limited".into(),
        })
        .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes[4..]).unwrap();
        assert_eq!(json["type"], "generation-error");
        assert_eq!(json["error"], "rate limited");
    }
}
