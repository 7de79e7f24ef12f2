//! Per-connection decode state.
//!
//! The receive loop owns exactly one [`ConnectionToken`] per connection and
//! passes it by `&mut` into the handshake and message processors, which
//! resume from it across partial socket reads.

// ============================================================================
// Imports
// ============================================================================

use crate::protocol::{DataSegmentFrame, HandshakeData, MessageHeadFrame, ProtocolVersion};

// ============================================================================
// FrameStage
// ============================================================================

/// Which part of a Hybi-10+ frame is being assembled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum FrameStage {
    /// Two base header bytes.
    #[default]
    Header,
    /// 2 or 8 extended length bytes.
    ExtendedLength,
    /// 4 mask key bytes.
    MaskKey,
    /// Payload bytes.
    Payload,
}

/// Hybi-00 byte-stream state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum LegacyStage {
    /// Between frames.
    #[default]
    Idle,
    /// Inside `0x00 ... 0xFF`.
    Text,
    /// Saw `0xFF`, expecting `0x00`.
    Closing,
}

// ============================================================================
// ConnectionToken
// ============================================================================

/// Scratch state for one connection.
///
/// At most one frame is in flight at a time. The frame fields return to
/// their zero state exactly when a frame completes; the handshake fields
/// when the handshake completes.
#[derive(Debug, Default)]
pub struct ConnectionToken {
    /// Request being parsed, frozen after the handshake.
    pub(crate) handshake: HandshakeData,
    /// Generation selected by the handshake.
    pub(crate) version: Option<ProtocolVersion>,

    /// Raw request bytes accumulated so far.
    pub(crate) handshake_buffer: Vec<u8>,
    /// Length of the request head (up to and including `\r\n\r\n`) once parsed.
    pub(crate) header_len: Option<usize>,

    pub(crate) stage: FrameStage,
    pub(crate) head_bytes: [u8; 2],
    pub(crate) head_filled: usize,
    pub(crate) head: Option<MessageHeadFrame>,
    pub(crate) length_bytes: [u8; 8],
    pub(crate) length_size: usize,
    pub(crate) length_filled: usize,
    pub(crate) mask: [u8; 4],
    pub(crate) mask_filled: usize,
    pub(crate) payload_len: u64,
    pub(crate) payload: Vec<u8>,
    pub(crate) segments: Vec<DataSegmentFrame>,

    pub(crate) legacy: LegacyStage,

    bytes_received: u64,
    messages_received: u64,
}

impl ConnectionToken {
    /// Creates an empty token.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The request as parsed so far.
    #[inline]
    #[must_use]
    pub fn handshake(&self) -> &HandshakeData {
        &self.handshake
    }

    /// Generation negotiated by the handshake, if it finished.
    #[inline]
    #[must_use]
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    /// Returns `true` once the handshake finished.
    #[inline]
    #[must_use]
    pub fn is_handshaked(&self) -> bool {
        self.handshake.handshaked
    }

    /// Total bytes fed into this token.
    #[inline]
    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Total messages decoded from this token.
    #[inline]
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    /// Returns `true` when no frame or fragmented message is partially assembled.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.stage == FrameStage::Header
            && self.head_filled == 0
            && self.segments.is_empty()
            && self.legacy == LegacyStage::Idle
            && self.payload.is_empty()
    }

    /// Marks the handshake complete and returns bytes that followed it.
    pub(crate) fn finish_handshake(
        &mut self,
        version: ProtocolVersion,
        consumed: usize,
    ) -> Vec<u8> {
        self.handshake.handshaked = true;
        self.version = Some(version);
        let trailing = self.handshake_buffer.split_off(consumed.min(self.handshake_buffer.len()));
        self.handshake_buffer = Vec::new();
        self.header_len = None;
        trailing
    }

    /// Resets the per-frame fields, keeping fragment segments.
    pub(crate) fn reset_frame(&mut self) {
        self.stage = FrameStage::Header;
        self.head_bytes = [0; 2];
        self.head_filled = 0;
        self.head = None;
        self.length_bytes = [0; 8];
        self.length_size = 0;
        self.length_filled = 0;
        self.mask = [0; 4];
        self.mask_filled = 0;
        self.payload_len = 0;
        self.payload = Vec::new();
    }

    pub(crate) fn record_bytes(&mut self, count: usize) {
        self.bytes_received += count as u64;
    }

    pub(crate) fn record_messages(&mut self, count: usize) {
        self.messages_received += count as u64;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_is_idle() {
        let token = ConnectionToken::new();
        assert!(token.is_idle());
        assert!(!token.is_handshaked());
        assert_eq!(token.version(), None);
    }

    #[test]
    fn test_finish_handshake_returns_trailing() {
        let mut token = ConnectionToken::new();
        token.handshake_buffer = b"HEAD\r\n\r\n\x81\x00".to_vec();
        let trailing = token.finish_handshake(ProtocolVersion::Rfc6455, 8);
        assert_eq!(trailing, vec![0x81, 0x00]);
        assert!(token.is_handshaked());
        assert!(token.handshake_buffer.is_empty());
        assert_eq!(token.version(), Some(ProtocolVersion::Rfc6455));
    }

    #[test]
    fn test_reset_frame_keeps_segments() {
        let mut token = ConnectionToken::new();
        token.stage = FrameStage::Payload;
        token.payload = vec![1, 2, 3];
        token.segments.push(DataSegmentFrame {
            head: MessageHeadFrame::parse([0x01, 0x00]),
            payload: vec![],
        });
        token.reset_frame();
        assert_eq!(token.stage, FrameStage::Header);
        assert!(token.payload.is_empty());
        assert_eq!(token.segments.len(), 1);
        assert!(!token.is_idle());
    }
}
