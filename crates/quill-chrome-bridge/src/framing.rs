//! Native-messaging frame codec
//!
//! Both transports carry the same wire unit: a 4-byte little-endian length
//! prefix followed by a UTF-8 JSON payload of exactly that length. The byte
//! order is a bit-exact compatibility boundary with Chrome's native-messaging
//! implementation and is pinned here rather than inferred.

use thiserror::Error;

use crate::envelope::Envelope;

/// Maximum frame payload size (1MB), matching the limit Chrome enforces on
/// messages sent to a native host.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 1_048_576;

/// Framing layer errors
///
/// `Encoding` and `Malformed` are fatal for a single message only; `TooLarge`
/// is fatal for the connection that produced it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FrameError {
    /// The envelope could not be serialized to JSON
    #[error("Failed to encode envelope: {0}")]
    Encoding(String),

    /// A complete frame arrived but its payload is not a valid envelope
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// The length prefix announces a payload beyond the configured maximum
    #[error("Frame of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: u32, max: u32 },
}

/// Frame encoder, parameterized by the maximum payload size.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: u32,
}

impl FrameCodec {
    pub fn new(max_frame_size: u32) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// Serialize one envelope into a single length-prefixed frame.
    pub fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, FrameError> {
        let payload =
            serde_json::to_vec(envelope).map_err(|e| FrameError::Encoding(e.to_string()))?;
        if payload.len() > self.max_frame_size as usize {
            return Err(FrameError::TooLarge {
                size: payload.len() as u32,
                max: self.max_frame_size,
            });
        }
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Create a decoder sharing this codec's size limit.
    pub fn decoder(&self) -> FrameDecoder {
        FrameDecoder::new(self.max_frame_size)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

/// Incremental pull decoder for a stream of frames.
///
/// Tolerates arbitrary fragmentation and coalescing: bytes are buffered until
/// a full prefix and payload are available, and after each consumed frame
/// decoding resumes at the next byte boundary. A malformed payload consumes
/// exactly that frame's bytes and leaves the stream decodable; an oversized
/// prefix poisons the decoder, since the stream position can no longer be
/// trusted.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_size: u32,
    fatal: Option<FrameError>,
}

impl FrameDecoder {
    pub fn new(max_frame_size: u32) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_size,
            fatal: None,
        }
    }

    /// Append bytes received from the transport.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pull the next complete envelope out of the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed. `Err(Malformed)` means
    /// one frame was discarded and the caller may keep pulling;
    /// `Err(TooLarge)` is terminal and repeats on every subsequent call.
    pub fn next(&mut self) -> Result<Option<Envelope>, FrameError> {
        if let Some(fatal) = &self.fatal {
            return Err(fatal.clone());
        }
        if self.buffer.len() < 4 {
            return Ok(None);
        }

        let len = u32::from_le_bytes([self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]]);
        if len == 0 {
            self.buffer.drain(..4);
            return Err(FrameError::Malformed("zero-length payload".to_string()));
        }
        if len > self.max_frame_size {
            let err = FrameError::TooLarge {
                size: len,
                max: self.max_frame_size,
            };
            self.fatal = Some(err.clone());
            return Err(err);
        }

        let total = 4 + len as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let parsed = serde_json::from_slice::<Envelope>(&self.buffer[4..total]);
        self.buffer.drain(..total);
        match parsed {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) => Err(FrameError::Malformed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeKind;
    use serde_json::json;

    fn sample() -> Envelope {
        Envelope::request("r1", "screenshot", json!({}))
    }

    #[test]
    fn test_round_trip_single_frame() {
        let codec = FrameCodec::default();
        let frame = codec.encode(&sample()).unwrap();
        let mut decoder = codec.decoder();
        decoder.extend(&frame);
        assert_eq!(decoder.next().unwrap(), Some(sample()));
        assert_eq!(decoder.next().unwrap(), None);
    }

    #[test]
    fn test_prefix_is_little_endian() {
        let codec = FrameCodec::default();
        let frame = codec.encode(&sample()).unwrap();
        let payload_len = (frame.len() - 4) as u32;
        assert_eq!(&frame[..4], &payload_len.to_le_bytes());
    }

    #[test]
    fn test_round_trip_at_maximum_size() {
        // Pad the args so the payload lands exactly on the limit.
        let codec = FrameCodec::new(512);
        let mut env = Envelope::request("r1", "screenshot", json!({"pad": ""}));
        let base = serde_json::to_vec(&env).unwrap().len();
        env.args = Some(json!({"pad": "x".repeat(512 - base)}));
        assert_eq!(serde_json::to_vec(&env).unwrap().len(), 512);

        let frame = codec.encode(&env).unwrap();
        let mut decoder = codec.decoder();
        decoder.extend(&frame);
        assert_eq!(decoder.next().unwrap(), Some(env));
    }

    #[test]
    fn test_encode_rejects_one_byte_over_maximum() {
        let codec = FrameCodec::new(512);
        let mut env = Envelope::request("r1", "screenshot", json!({"pad": ""}));
        let base = serde_json::to_vec(&env).unwrap().len();
        env.args = Some(json!({"pad": "x".repeat(513 - base)}));
        assert_eq!(serde_json::to_vec(&env).unwrap().len(), 513);

        match codec.encode(&env) {
            Err(FrameError::TooLarge { size, max }) => {
                assert_eq!(size, 513);
                assert_eq!(max, 512);
            }
            other => panic!("expected TooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_decoder_rejects_oversized_prefix_and_stays_poisoned() {
        let mut decoder = FrameDecoder::new(64);
        decoder.extend(&200u32.to_le_bytes());
        assert!(matches!(decoder.next(), Err(FrameError::TooLarge { .. })));
        // The stream position is untrusted from here on.
        decoder.extend(b"more bytes");
        assert!(matches!(decoder.next(), Err(FrameError::TooLarge { .. })));
    }

    #[test]
    fn test_fragmentation_at_every_boundary() {
        let codec = FrameCodec::default();
        let frame = codec.encode(&sample()).unwrap();
        for split in 1..frame.len() {
            let mut decoder = codec.decoder();
            decoder.extend(&frame[..split]);
            assert_eq!(decoder.next().unwrap(), None, "split at {split}");
            decoder.extend(&frame[split..]);
            assert_eq!(decoder.next().unwrap(), Some(sample()), "split at {split}");
            assert_eq!(decoder.next().unwrap(), None);
        }
    }

    #[test]
    fn test_byte_at_a_time_feed() {
        let codec = FrameCodec::default();
        let frame = codec.encode(&sample()).unwrap();
        let mut decoder = codec.decoder();
        let mut seen = Vec::new();
        for byte in &frame {
            decoder.extend(std::slice::from_ref(byte));
            if let Some(env) = decoder.next().unwrap() {
                seen.push(env);
            }
        }
        assert_eq!(seen, vec![sample()]);
    }

    #[test]
    fn test_coalesced_frames_decode_in_order() {
        let codec = FrameCodec::default();
        let a = Envelope::request("a", "navigate", json!({"url": "x"}));
        let b = Envelope::response("b", json!({"ok": true}));
        let mut bytes = codec.encode(&a).unwrap();
        bytes.extend(codec.encode(&b).unwrap());

        let mut decoder = codec.decoder();
        decoder.extend(&bytes);
        assert_eq!(decoder.next().unwrap(), Some(a));
        assert_eq!(decoder.next().unwrap(), Some(b));
        assert_eq!(decoder.next().unwrap(), None);
    }

    #[test]
    fn test_malformed_frame_is_skipped_without_poisoning_stream() {
        let codec = FrameCodec::default();
        let garbage = b"{not json";
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(garbage.len() as u32).to_le_bytes());
        bytes.extend_from_slice(garbage);
        bytes.extend(codec.encode(&sample()).unwrap());

        let mut decoder = codec.decoder();
        decoder.extend(&bytes);
        assert!(matches!(decoder.next(), Err(FrameError::Malformed(_))));
        // The frame after the corrupt one decodes normally.
        assert_eq!(decoder.next().unwrap(), Some(sample()));
    }

    #[test]
    fn test_zero_length_payload_is_malformed() {
        let codec = FrameCodec::default();
        let mut decoder = codec.decoder();
        decoder.extend(&0u32.to_le_bytes());
        decoder.extend(codec.encode(&sample()).unwrap().as_slice());
        assert!(matches!(decoder.next(), Err(FrameError::Malformed(_))));
        assert_eq!(decoder.next().unwrap(), Some(sample()));
    }

    #[test]
    fn test_valid_json_with_wrong_shape_is_malformed() {
        let garbage = br#"{"type":"ping"}"#;
        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
        decoder.extend(&(garbage.len() as u32).to_le_bytes());
        decoder.extend(garbage);
        assert!(matches!(decoder.next(), Err(FrameError::Malformed(_))));
    }

    #[test]
    fn test_empty_object_args_round_trip() {
        let codec = FrameCodec::default();
        let env = Envelope::request("r", "screenshot", json!({}));
        let frame = codec.encode(&env).unwrap();
        let mut decoder = codec.decoder();
        decoder.extend(&frame);
        let out = decoder.next().unwrap().unwrap();
        assert_eq!(out.kind, EnvelopeKind::Request);
        assert_eq!(out.args, Some(json!({})));
    }
}
