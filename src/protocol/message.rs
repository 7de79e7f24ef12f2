//! Completed application messages and text encodings.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use super::{CloseReason, Opcode};

// ============================================================================
// DataMessage
// ============================================================================

/// A fully reassembled message.
///
/// Constructed once per decoded message and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage {
    opcode: Opcode,
    payload: Vec<u8>,
}

impl DataMessage {
    /// Creates a message.
    #[inline]
    #[must_use]
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self { opcode, payload }
    }

    /// Logical opcode (the first frame's opcode for fragmented messages).
    #[inline]
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Unmasked payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the message, returning its payload.
    #[inline]
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Returns `true` for text messages.
    #[inline]
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.opcode == Opcode::Text
    }

    /// Returns `true` for close messages.
    #[inline]
    #[must_use]
    pub fn is_close(&self) -> bool {
        self.opcode == Opcode::Close
    }

    /// Decodes the payload as text.
    #[must_use]
    pub fn text(&self, encoding: TextEncoding) -> Cow<'_, str> {
        encoding.decode(&self.payload)
    }

    /// Close code and reason carried by a close message.
    #[must_use]
    pub fn close_reason(&self) -> CloseReason {
        CloseReason::parse_lossy(&self.payload)
    }
}

// ============================================================================
// TextEncoding
// ============================================================================

/// Character encoding applied to text payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// UTF-8, as required by Hybi-10 and RFC 6455.
    #[default]
    Utf8,
    /// ISO-8859-1, for legacy peers. Characters above U+00FF become `?`.
    Latin1,
}

impl TextEncoding {
    /// Encodes `text` into payload bytes.
    #[must_use]
    pub fn encode<'a>(self, text: &'a str) -> Cow<'a, [u8]> {
        match self {
            Self::Utf8 => Cow::Borrowed(text.as_bytes()),
            Self::Latin1 if text.is_ascii() => Cow::Borrowed(text.as_bytes()),
            Self::Latin1 => Cow::Owned(
                text.chars()
                    .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                    .collect(),
            ),
        }
    }

    /// Decodes payload bytes, replacing invalid UTF-8 sequences.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> Cow<'_, str> {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes),
            Self::Latin1 if bytes.is_ascii() => String::from_utf8_lossy(bytes),
            Self::Latin1 => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_accessors() {
        let message = DataMessage::new(Opcode::Text, b"Hello".to_vec());
        assert!(message.is_text());
        assert!(!message.is_close());
        assert_eq!(message.payload(), b"Hello");
        assert_eq!(message.text(TextEncoding::Utf8), "Hello");
        assert_eq!(message.into_payload(), b"Hello".to_vec());
    }

    #[test]
    fn test_close_reason() {
        let message = DataMessage::new(Opcode::Close, vec![0x03, 0xE9, b'o', b'k']);
        let reason = message.close_reason();
        assert_eq!(reason.code, Some(1001));
        assert_eq!(reason.reason, "ok");
    }

    #[test]
    fn test_latin1_encoding() {
        let bytes = TextEncoding::Latin1.encode("café€");
        assert_eq!(bytes.as_ref(), &[b'c', b'a', b'f', 0xE9, b'?']);
        assert_eq!(TextEncoding::Latin1.decode(&[b'c', 0xE9]), "cé");
    }

    #[test]
    fn test_utf8_encoding_borrows() {
        assert!(matches!(TextEncoding::Utf8.encode("abc"), Cow::Borrowed(_)));
        assert_eq!(TextEncoding::Utf8.decode("é".as_bytes()), "é");
    }
}
