//! Error types for the WebSocket engine.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use websocket_engine::{Connection, Result};
//!
//! fn greet(connection: &Connection) -> Result<()> {
//!     connection.send_text("hello")?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::PoolExhausted`] |
//! | Handshake | [`Error::Handshake`], [`Error::HandshakeTimeout`] |
//! | Protocol | [`Error::Protocol`], [`Error::InvalidCloseCode`], [`Error::InvalidUtf8`], [`Error::MessageTooLarge`], [`Error::Unsupported`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

use crate::protocol::{ProtocolVersion, close_code};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when listener configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection-level failure.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The connection is closing or already closed.
    ///
    /// Returned when sending on a connection that no longer accepts data.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A bounded buffer pool has no free buffers.
    #[error("Buffer pool exhausted: {capacity} buffers in use")]
    PoolExhausted {
        /// Total capacity of the exhausted pool.
        capacity: usize,
    },

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// Malformed or rejected upgrade request.
    #[error("Handshake error: {message}")]
    Handshake {
        /// Description of the handshake failure.
        message: String,
    },

    /// The opening or closing handshake did not finish in time.
    #[error("Handshake timeout after {timeout_ms}ms")]
    HandshakeTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Framing violation.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Close frame carried a status code the negotiated version rejects.
    #[error("Invalid close code {code} for {version}")]
    InvalidCloseCode {
        /// The rejected code.
        code: u16,
        /// Protocol generation that rejected it.
        version: ProtocolVersion,
    },

    /// Close reason was not valid UTF-8.
    #[error("Invalid UTF-8 in close reason")]
    InvalidUtf8,

    /// Message exceeds the configured maximum size.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Declared or accumulated size in bytes.
        size: u64,
        /// Configured maximum in bytes.
        max: usize,
    },

    /// Operation not available in the negotiated protocol generation.
    #[error("{operation} is not supported by {version}")]
    Unsupported {
        /// The operation attempted.
        operation: String,
        /// Negotiated protocol generation.
        version: ProtocolVersion,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL construction error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a pool exhausted error.
    #[inline]
    pub fn pool_exhausted(capacity: usize) -> Self {
        Self::PoolExhausted { capacity }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a handshake timeout error.
    #[inline]
    pub fn handshake_timeout(timeout_ms: u64) -> Self {
        Self::HandshakeTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid close code error.
    #[inline]
    pub fn invalid_close_code(code: u16, version: ProtocolVersion) -> Self {
        Self::InvalidCloseCode { code, version }
    }

    /// Creates a message too large error.
    #[inline]
    pub fn message_too_large(size: u64, max: usize) -> Self {
        Self::MessageTooLarge { size, max }
    }

    /// Creates an unsupported operation error.
    #[inline]
    pub fn unsupported(operation: impl Into<String>, version: ProtocolVersion) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            version,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::HandshakeTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::PoolExhausted { .. } | Self::Io(_)
        )
    }

    /// Returns `true` if the peer violated the wire protocol.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. }
                | Self::InvalidCloseCode { .. }
                | Self::InvalidUtf8
                | Self::MessageTooLarge { .. }
        )
    }

    /// Close code to send to the peer when this error terminates a connection.
    ///
    /// Returns `None` for errors that close the socket without a close frame.
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::Protocol { .. } | Self::InvalidCloseCode { .. } => Some(close_code::PROTOCOL_ERROR),
            Self::InvalidUtf8 => Some(close_code::INVALID_PAYLOAD),
            Self::MessageTooLarge { .. } => Some(close_code::MESSAGE_TOO_BIG),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("reset by peer");
        assert_eq!(err.to_string(), "Connection failed: reset by peer");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("buffer_size must be > 0");
        assert_eq!(err.to_string(), "Configuration error: buffer_size must be > 0");
    }

    #[test]
    fn test_invalid_close_code_display() {
        let err = Error::invalid_close_code(999, ProtocolVersion::Rfc6455);
        assert_eq!(err.to_string(), "Invalid close code 999 for RFC 6455");
    }

    #[test]
    fn test_is_protocol_error() {
        assert!(Error::protocol("bad opcode").is_protocol_error());
        assert!(Error::message_too_large(10, 5).is_protocol_error());
        assert!(Error::InvalidUtf8.is_protocol_error());
        assert!(!Error::ConnectionClosed.is_protocol_error());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::pool_exhausted(4).is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_close_code_mapping() {
        assert_eq!(Error::protocol("rsv").close_code(), Some(1002));
        assert_eq!(Error::InvalidUtf8.close_code(), Some(1007));
        assert_eq!(Error::message_too_large(1, 0).close_code(), Some(1009));
        assert_eq!(Error::ConnectionClosed.close_code(), None);
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::handshake_timeout(5000).is_timeout());
        assert!(!Error::handshake("missing Upgrade").is_timeout());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::ConnectionReset, "reset");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
