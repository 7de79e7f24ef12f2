//! Protocol generations and URI schemes.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// ProtocolVersion
// ============================================================================

/// One of the three supported WebSocket protocol generations.
///
/// Ordered oldest to newest, so `min` picks the older generation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    /// draft-hixie-76 / draft-ietf-hybi-00 (no version header).
    Hybi00,
    /// draft-ietf-hybi-10 (`Sec-WebSocket-Version: 8`).
    Hybi10,
    /// RFC 6455 (`Sec-WebSocket-Version: 13`).
    #[default]
    Rfc6455,
}

impl ProtocolVersion {
    /// Maps a `Sec-WebSocket-Version` header value to its generation.
    ///
    /// Values below 8 are legacy requests. Values above 13 are unknown and
    /// yield `None`.
    #[must_use]
    pub const fn from_requested(version: u32) -> Option<Self> {
        match version {
            0..=7 => Some(Self::Hybi00),
            8..=12 => Some(Self::Hybi10),
            13 => Some(Self::Rfc6455),
            _ => None,
        }
    }

    /// The version number this generation announces on the wire.
    #[inline]
    #[must_use]
    pub const fn wire_version(self) -> u32 {
        match self {
            Self::Hybi00 => 0,
            Self::Hybi10 => 8,
            Self::Rfc6455 => 13,
        }
    }

    /// Returns `true` for generations using the binary frame header.
    #[inline]
    #[must_use]
    pub const fn is_framed(self) -> bool {
        !matches!(self, Self::Hybi00)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hybi00 => "Hybi-00",
            Self::Hybi10 => "Hybi-10",
            Self::Rfc6455 => "RFC 6455",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Scheme
// ============================================================================

/// URI scheme a client used to reach the listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain `ws://`.
    #[default]
    Ws,
    /// `wss://`, TLS terminated in front of the listener.
    Wss,
}

impl Scheme {
    /// Returns the scheme as it appears in a URI.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
