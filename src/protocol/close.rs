//! Close codes and close frame payloads.
//!
//! A close payload is either empty, or a 2-byte big-endian status code
//! followed by an optional UTF-8 reason.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

use super::ProtocolVersion;

// ============================================================================
// Close Codes
// ============================================================================

/// Well-known close status codes.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away.
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error.
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Unsupported data type.
    pub const UNSUPPORTED_DATA: u16 = 1003;
    /// Payload data inconsistent with the message type.
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Policy violation.
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Message too big to process.
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    /// Server hit an unexpected condition (RFC 6455 only).
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// Hybi-10 close code rule.
#[inline]
#[must_use]
pub const fn is_valid_hybi10_code(code: u16) -> bool {
    matches!(code, 1000..=1010)
}

/// RFC 6455 close code rule, including the application range.
#[inline]
#[must_use]
pub const fn is_valid_rfc6455_code(code: u16) -> bool {
    matches!(code, 1000..=1011 | 1015 | 3000..=4999)
}

impl ProtocolVersion {
    /// Returns `true` if `code` may appear in a close frame of this generation.
    ///
    /// Hybi-00 has no close codes on the wire; it shares the Hybi-10 rule.
    #[inline]
    #[must_use]
    pub const fn is_valid_close_code(self, code: u16) -> bool {
        match self {
            Self::Hybi00 | Self::Hybi10 => is_valid_hybi10_code(code),
            Self::Rfc6455 => is_valid_rfc6455_code(code),
        }
    }
}

// ============================================================================
// CloseReason
// ============================================================================

/// Parsed close frame payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReason {
    /// Status code, if the payload carried one.
    pub code: Option<u16>,
    /// Reason text (empty when absent).
    pub reason: String,
}

impl CloseReason {
    /// Creates a close reason with a code and text.
    #[inline]
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
        }
    }

    /// Normal closure without text.
    #[inline]
    #[must_use]
    pub fn normal() -> Self {
        Self::new(close_code::NORMAL, "")
    }

    /// Parses and validates a close payload for the given generation.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the payload is exactly one byte
    /// - [`Error::InvalidCloseCode`] if the code is not valid for `version`
    /// - [`Error::InvalidUtf8`] if the reason is not UTF-8
    pub fn parse(payload: &[u8], version: ProtocolVersion) -> Result<Self> {
        match payload {
            [] => Ok(Self::default()),
            [_] => Err(Error::protocol("close payload of 1 byte")),
            [hi, lo, rest @ ..] => {
                let code = u16::from_be_bytes([*hi, *lo]);
                if !version.is_valid_close_code(code) {
                    return Err(Error::invalid_close_code(code, version));
                }
                let reason = std::str::from_utf8(rest).map_err(|_| Error::InvalidUtf8)?;
                Ok(Self {
                    code: Some(code),
                    reason: reason.to_string(),
                })
            }
        }
    }

    /// Parses a payload without validation, replacing bad UTF-8.
    #[must_use]
    pub fn parse_lossy(payload: &[u8]) -> Self {
        match payload {
            [hi, lo, rest @ ..] => Self {
                code: Some(u16::from_be_bytes([*hi, *lo])),
                reason: String::from_utf8_lossy(rest).into_owned(),
            },
            _ => Self::default(),
        }
    }

    /// Encodes this reason as a close frame payload.
    ///
    /// The reason is truncated on a character boundary so the payload fits
    /// a control frame (125 bytes).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let Some(code) = self.code else {
            return Vec::new();
        };
        let reason = truncate_utf8(&self.reason, 123);
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        payload
    }
}

/// Truncates `text` to at most `max` bytes on a char boundary.
fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ============================================================================
// Tests
// ============================================================================
