//! Frame header view, segments and masking.
//!
//! # Frame Format (Hybi-10 / RFC 6455)
//!
//! ```text
//! [FIN|RSV1-3|Opcode(4)][MASK|Len7][ExtLen16 or ExtLen64][Mask32?][Payload]
//! ```
//!
//! Extended lengths are big-endian. Masking XORs each payload byte with
//! `key[i % 4]`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// Opcode
// ============================================================================

/// 4-bit frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation = 0x0,
    /// UTF-8 text data.
    Text = 0x1,
    /// Binary data.
    Binary = 0x2,
    /// Connection close.
    Close = 0x8,
    /// Ping.
    Ping = 0x9,
    /// Pong.
    Pong = 0xA,
}

impl Opcode {
    /// Parses a 4-bit opcode. Reserved values yield `None`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// Wire value.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` for Close, Ping and Pong.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// MessageHeadFrame
// ============================================================================

/// View over the first two header bytes of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeadFrame {
    /// Final fragment flag.
    pub fin: bool,
    /// The three reserved bits, right-aligned (`RSV1` is `0b100`).
    pub rsv: u8,
    /// Raw 4-bit opcode (may be a reserved value).
    pub opcode: u8,
    /// Mask-present flag.
    pub masked: bool,
    /// 7-bit length field; 126 and 127 announce extended lengths.
    pub payload_len: u8,
}

impl MessageHeadFrame {
    /// Decodes the two base header bytes.
    #[must_use]
    pub const fn parse(bytes: [u8; 2]) -> Self {
        Self {
            fin: bytes[0] & 0x80 != 0,
            rsv: (bytes[0] >> 4) & 0x07,
            opcode: bytes[0] & 0x0F,
            masked: bytes[1] & 0x80 != 0,
            payload_len: bytes[1] & 0x7F,
        }
    }

    /// Re-encodes the two base header bytes.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 2] {
        let mut first = (self.rsv & 0x07) << 4 | (self.opcode & 0x0F);
        if self.fin {
            first |= 0x80;
        }
        let mut second = self.payload_len & 0x7F;
        if self.masked {
            second |= 0x80;
        }
        [first, second]
    }

    /// Returns `true` if any RSV bit is set.
    #[inline]
    #[must_use]
    pub const fn has_reserved_bits(&self) -> bool {
        self.rsv != 0
    }

    /// Parsed opcode, `None` for reserved values.
    #[inline]
    #[must_use]
    pub const fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }

    /// Number of extended length bytes following the base header.
    #[inline]
    #[must_use]
    pub const fn extended_length_size(&self) -> usize {
        match self.payload_len {
            126 => 2,
            127 => 8,
            _ => 0,
        }
    }
}

// ============================================================================
// DataSegmentFrame
// ============================================================================

/// One unmasked frame of a fragmented message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegmentFrame {
    /// Header of the frame.
    pub head: MessageHeadFrame,
    /// Unmasked payload.
    pub payload: Vec<u8>,
}

// ============================================================================
// Masking
// ============================================================================

/// XORs `payload` in place with the 4-byte `key`.
///
/// Applying the same key twice restores the original bytes.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
}

// ============================================================================
// Tests
// ============================================================================
