//! Listener configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use websocket_engine::{ListenerOptions, ProtocolVersion};
//!
//! let options = ListenerOptions::new()
//!     .with_min_version(ProtocolVersion::Hybi10)
//!     .with_buffer_size(8192)
//!     .with_open_handshake_timeout(Duration::from_secs(2))
//!     .with_protocol("chat");
//! ```
//!
//! Options can also be read from JSON. Durations are given in milliseconds
//! and missing fields keep their defaults:
//!
//! ```json
//! { "backlog": 256, "min_version": "hybi10", "open_handshake_timeout_ms": 2000 }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::processor::{
    DEFAULT_MAX_HANDSHAKE_SIZE, DEFAULT_MAX_MESSAGE_SIZE, FrameSettings, HandshakeSettings,
};
use crate::protocol::{ProtocolVersion, Scheme, TextEncoding};

// ============================================================================
// Constants
// ============================================================================

/// Default listen backlog.
pub const DEFAULT_BACKLOG: u32 = 128;

/// Default size of each pooled buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Default receive pool size (maximum concurrent connections).
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Default send pool size.
pub const DEFAULT_SEND_POOL_SIZE: usize = 1024;

/// Default opening and closing handshake timeout.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout sweep interval.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// ListenerOptions
// ============================================================================

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerOptions {
    /// Pending connection queue length passed to `listen`.
    pub backlog: u32,

    /// Newest protocol generation offered.
    pub protocol: ProtocolVersion,

    /// Oldest protocol generation accepted.
    pub min_version: ProtocolVersion,

    /// Size of each pooled receive and send buffer in bytes.
    pub buffer_size: usize,

    /// Receive pool size. Connections beyond it are dropped on accept.
    pub max_connections: usize,

    /// Send pool size. Sends wait while it is exhausted.
    pub send_pool_size: usize,

    /// Time allowed for the opening handshake.
    #[serde(rename = "open_handshake_timeout_ms", with = "duration_ms")]
    pub open_handshake_timeout: Duration,

    /// Time allowed for the peer to answer our close frame.
    #[serde(rename = "close_handshake_timeout_ms", with = "duration_ms")]
    pub close_handshake_timeout: Duration,

    /// How often handshake timeouts are checked.
    #[serde(rename = "sweep_interval_ms", with = "duration_ms")]
    pub sweep_interval: Duration,

    /// Largest accepted request head in bytes.
    pub max_handshake_size: usize,

    /// Largest accepted message in bytes.
    pub max_message_size: usize,

    /// Mask outgoing frames.
    pub mask_outgoing: bool,

    /// Answer pings automatically.
    pub auto_pong: bool,

    /// Encoding for text sent with `send_text`.
    pub encoding: TextEncoding,

    /// Advertise `wss://` locations (TLS terminated in front).
    pub secure: bool,

    /// Supported sub-protocols. Empty accepts the client's first choice.
    pub protocols: Vec<String>,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ListenerOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG,
            protocol: ProtocolVersion::Rfc6455,
            min_version: ProtocolVersion::Hybi00,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            send_pool_size: DEFAULT_SEND_POOL_SIZE,
            open_handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            close_handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_handshake_size: DEFAULT_MAX_HANDSHAKE_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            mask_outgoing: false,
            auto_pong: true,
            encoding: TextEncoding::Utf8,
            secure: false,
            protocols: Vec::new(),
        }
    }

    /// Parses options from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the document is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads options from a JSON file.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Io`] if the file cannot be read
    /// - [`crate::Error::Json`] if it is malformed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ListenerOptions {
    /// Sets the listen backlog.
    #[inline]
    #[must_use]
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Sets the newest protocol generation offered.
    #[inline]
    #[must_use]
    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol = version;
        self
    }

    /// Sets the oldest protocol generation accepted.
    #[inline]
    #[must_use]
    pub fn with_min_version(mut self, version: ProtocolVersion) -> Self {
        self.min_version = version;
        self
    }

    /// Sets the pooled buffer size.
    #[inline]
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Sets the receive pool size.
    #[inline]
    #[must_use]
    pub fn with_max_connections(mut self, count: usize) -> Self {
        self.max_connections = count;
        self
    }

    /// Sets the send pool size.
    #[inline]
    #[must_use]
    pub fn with_send_pool_size(mut self, count: usize) -> Self {
        self.send_pool_size = count;
        self
    }

    /// Sets the opening handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_open_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.open_handshake_timeout = timeout;
        self
    }

    /// Sets the closing handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_close_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.close_handshake_timeout = timeout;
        self
    }

    /// Sets the timeout sweep interval.
    #[inline]
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the maximum request head size.
    #[inline]
    #[must_use]
    pub fn with_max_handshake_size(mut self, size: usize) -> Self {
        self.max_handshake_size = size;
        self
    }

    /// Sets the maximum message size.
    #[inline]
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Enables masking of outgoing frames.
    #[inline]
    #[must_use]
    pub fn with_mask_outgoing(mut self) -> Self {
        self.mask_outgoing = true;
        self
    }

    /// Disables automatic pong replies.
    #[inline]
    #[must_use]
    pub fn without_auto_pong(mut self) -> Self {
        self.auto_pong = false;
        self
    }

    /// Sets the text encoding.
    #[inline]
    #[must_use]
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Advertises `wss://` locations.
    #[inline]
    #[must_use]
    pub fn with_secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Adds a supported sub-protocol.
    #[inline]
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl ListenerOptions {
    /// Scheme clients use to reach the listener.
    #[inline]
    #[must_use]
    pub const fn scheme(&self) -> Scheme {
        if self.secure { Scheme::Wss } else { Scheme::Ws }
    }

    /// Settings for the handshake processor.
    #[must_use]
    pub fn handshake_settings(&self) -> HandshakeSettings {
        HandshakeSettings {
            version: self.protocol,
            min_version: self.min_version,
            max_size: self.max_handshake_size,
            protocols: self.protocols.clone(),
            scheme: self.scheme(),
        }
    }

    /// Settings for message processors.
    #[inline]
    #[must_use]
    pub const fn frame_settings(&self) -> FrameSettings {
        FrameSettings {
            mask_outgoing: self.mask_outgoing,
            max_message_size: self.max_message_size,
        }
    }

    /// Validates the options configuration.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.buffer_size == 0 {
            return Err("Buffer size must be greater than zero".to_string());
        }
        if self.max_connections == 0 || self.send_pool_size == 0 {
            return Err("Pool sizes must be greater than zero".to_string());
        }
        if self.backlog == 0 {
            return Err("Backlog must be greater than zero".to_string());
        }
        if self.min_version > self.protocol {
            return Err(format!(
                "Minimum version {} is newer than protocol version {}",
                self.min_version, self.protocol
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err("Sweep interval must be greater than zero".to_string());
        }
        if self.max_handshake_size == 0 || self.max_message_size == 0 {
            return Err("Size limits must be greater than zero".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

/// `Duration` as integer milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================
