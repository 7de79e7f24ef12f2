//! Hybi-00 sentinel framing.

// ============================================================================
// Imports
// ============================================================================

use std::mem;

use tracing::trace;

use crate::error::{Error, Result};
use crate::processor::ConnectionToken;
use crate::processor::token::LegacyStage;
use crate::protocol::{DataMessage, Opcode, ProtocolVersion};

use super::{FrameSettings, MessageProcessor, ReadOutcome};

// ============================================================================
// Constants
// ============================================================================

const FRAME_START: u8 = 0x00;
const FRAME_END: u8 = 0xFF;

/// The complete close signal.
const CLOSE_FRAME: [u8; 2] = [FRAME_END, FRAME_START];

// ============================================================================
// Hybi00MessageProcessor
// ============================================================================

/// Text-only framing for draft-76 peers.
#[derive(Debug, Clone)]
pub struct Hybi00MessageProcessor {
    settings: FrameSettings,
}

impl Hybi00MessageProcessor {
    /// Creates the processor.
    #[must_use]
    pub fn new(settings: FrameSettings) -> Self {
        Self { settings }
    }
}

impl MessageProcessor for Hybi00MessageProcessor {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::Hybi00
    }

    fn try_read_message(&self, token: &mut ConnectionToken, bytes: &[u8]) -> Result<ReadOutcome> {
        token.record_bytes(bytes.len());
        let messages = decode_legacy(token, bytes, self.settings.max_message_size)?;
        token.record_messages(messages.len());
        Ok(ReadOutcome {
            complete: token.is_idle(),
            messages,
        })
    }

    fn build_frame(&self, opcode: Opcode, payload: &[u8]) -> Result<Vec<u8>> {
        match opcode {
            Opcode::Text | Opcode::Binary => {
                if payload.contains(&FRAME_END) {
                    return Err(Error::protocol("Hybi-00 payload cannot contain 0xFF"));
                }
                let mut frame = Vec::with_capacity(payload.len() + 2);
                frame.push(FRAME_START);
                frame.extend_from_slice(payload);
                frame.push(FRAME_END);
                Ok(frame)
            }
            Opcode::Close => Ok(CLOSE_FRAME.to_vec()),
            Opcode::Ping | Opcode::Pong | Opcode::Continuation => Err(Error::unsupported(
                format!("{opcode} frames"),
                ProtocolVersion::Hybi00,
            )),
        }
    }

    fn build_close_frame(&self, _code: u16, _reason: &str) -> Vec<u8> {
        CLOSE_FRAME.to_vec()
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Scans `bytes` for sentinel-delimited frames, resuming from `token`.
pub(crate) fn decode_legacy(
    token: &mut ConnectionToken,
    mut bytes: &[u8],
    max_message_size: usize,
) -> Result<Vec<DataMessage>> {
    let mut messages = Vec::new();

    while let Some((&first, rest)) = bytes.split_first() {
        match token.legacy {
            LegacyStage::Idle => {
                token.legacy = match first {
                    FRAME_START => LegacyStage::Text,
                    FRAME_END => LegacyStage::Closing,
                    other => {
                        return Err(Error::protocol(format!(
                            "unexpected Hybi-00 frame type 0x{other:02X}"
                        )));
                    }
                };
                bytes = rest;
            }
            LegacyStage::Text => {
                let end = bytes.iter().position(|&b| b == FRAME_END);
                let chunk = &bytes[..end.unwrap_or(bytes.len())];

                let size = token.payload.len() + chunk.len();
                if size > max_message_size {
                    return Err(Error::message_too_large(size as u64, max_message_size));
                }
                token.payload.extend_from_slice(chunk);

                match end {
                    Some(end) => {
                        let payload = mem::take(&mut token.payload);
                        trace!(len = payload.len(), "Hybi-00 text frame");
                        messages.push(DataMessage::new(Opcode::Text, payload));
                        token.legacy = LegacyStage::Idle;
                        bytes = &bytes[end + 1..];
                    }
                    None => bytes = &[],
                }
            }
            LegacyStage::Closing => {
                if first != FRAME_START {
                    return Err(Error::protocol(format!(
                        "malformed Hybi-00 close frame: 0xFF 0x{first:02X}"
                    )));
                }
                messages.push(DataMessage::new(Opcode::Close, Vec::new()));
                token.legacy = LegacyStage::Idle;
                bytes = rest;
            }
        }
    }

    Ok(messages)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> Hybi00MessageProcessor {
        Hybi00MessageProcessor::new(FrameSettings::default())
    }

    #[test]
    fn test_decode_two_frames() {
        let mut token = ConnectionToken::new();
        let outcome = processor()
            .try_read_message(&mut token, b"\x00hello\xFF\x00world\xFF")
            .expect("valid frames");
        assert!(outcome.complete);
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.messages[0].payload(), b"hello");
        assert_eq!(outcome.messages[1].payload(), b"world");
        assert_eq!(token.messages_received(), 2);
    }

    #[test]
    fn test_partial_frame_stays_buffered() {
        let mut token = ConnectionToken::new();
        let processor = processor();
        let outcome = processor
            .try_read_message(&mut token, b"\x00hel")
            .expect("partial frame");
        assert!(!outcome.complete);
        assert!(outcome.messages.is_empty());

        let outcome = processor
            .try_read_message(&mut token, b"lo\xFF")
            .expect("rest of frame");
        assert!(outcome.complete);
        assert_eq!(outcome.messages[0].payload(), b"hello");
    }

    #[test]
    fn test_byte_at_a_time() {
        let bytes = b"\x00abc\xFF\xFF\x00";
        let mut token = ConnectionToken::new();
        let processor = processor();
        let mut messages = Vec::new();
        for byte in bytes {
            messages.extend(
                processor
                    .try_read_message(&mut token, std::slice::from_ref(byte))
                    .expect("valid stream")
                    .messages,
            );
        }
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].payload(), b"abc");
        assert!(messages[1].is_close());
    }

    #[test]
    fn test_unknown_frame_type_is_error() {
        let mut token = ConnectionToken::new();
        let err = processor()
            .try_read_message(&mut token, b"\x80\x05")
            .unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_oversized_message() {
        let processor = Hybi00MessageProcessor::new(FrameSettings {
            max_message_size: 4,
            ..Default::default()
        });
        let mut token = ConnectionToken::new();
        let err = processor
            .try_read_message(&mut token, b"\x00hello")
            .unwrap_err();
        assert_eq!(err.close_code(), Some(1009));
    }

    #[test]
    fn test_build_frames() {
        let processor = processor();
        assert_eq!(
            processor.build_frame(Opcode::Text, b"hi").expect("text frame"),
            b"\x00hi\xFF".to_vec()
        );
        assert_eq!(
            processor.build_frame(Opcode::Close, b"").expect("close frame"),
            vec![0xFF, 0x00]
        );
        assert_eq!(processor.build_close_frame(1000, "bye"), vec![0xFF, 0x00]);
        assert!(processor.build_frame(Opcode::Text, &[0x41, 0xFF]).is_err());
        assert!(matches!(
            processor.build_frame(Opcode::Ping, b""),
            Err(Error::Unsupported { .. })
        ));
    }

    #[test]
    fn test_close_codes_follow_hybi10() {
        let processor = processor();
        assert!(processor.is_valid_close_code(1010));
        assert!(!processor.is_valid_close_code(1011));
        assert!(!processor.is_valid_close_code(999));
    }
}
