//! Parsed upgrade request.
//!
//! [`HandshakeData`] is filled in by the handshake processor while the
//! request is parsed and frozen once `handshaked` is set. Connections hand
//! it out by shared reference only.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use url::Url;

use crate::error::Result;

use super::{ProtocolVersion, Scheme};

// ============================================================================
// Header Names
// ============================================================================

pub(crate) const HEADER_KEY: &str = "Sec-WebSocket-Key";
pub(crate) const HEADER_KEY1: &str = "Sec-WebSocket-Key1";
pub(crate) const HEADER_KEY2: &str = "Sec-WebSocket-Key2";
pub(crate) const HEADER_ORIGIN: &str = "Origin";
pub(crate) const HEADER_LEGACY_ORIGIN: &str = "Sec-WebSocket-Origin";
pub(crate) const HEADER_UPGRADE: &str = "Upgrade";
pub(crate) const HEADER_CONNECTION: &str = "Connection";

// ============================================================================
// HandshakeData
// ============================================================================

/// One connection attempt's upgrade request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeData {
    /// `true` when this side initiated the connection.
    pub is_client: bool,
    /// Set once the handshake completed; no further mutation after that.
    pub handshaked: bool,
    /// HTTP method of the request line.
    pub method: String,
    /// Request target, including any query string.
    pub path: String,
    /// HTTP version token, e.g. `HTTP/1.1`.
    pub http_version: String,
    /// `Host` header value.
    pub host: String,
    /// `Sec-WebSocket-Version` value, 0 when absent.
    pub version: u32,
    /// Sub-protocols offered by the client, in order.
    pub requested_protocols: Vec<String>,
    /// Negotiated sub-protocol.
    pub protocol: Option<String>,
    /// Cookies from the `Cookie` header, percent-decoded.
    pub cookies: FxHashMap<String, String>,
    /// Every other header, name as sent.
    pub params: FxHashMap<String, String>,
    /// Scheme the client used.
    pub scheme: Scheme,
    /// Hybi-00 8-byte nonce following the request headers.
    pub nonce: Option<[u8; 8]>,
}

impl HandshakeData {
    /// Looks up a free-form header, ignoring ASCII case.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns `true` if the header was present.
    #[inline]
    #[must_use]
    pub fn has_param(&self, name: &str) -> bool {
        self.param(name).is_some()
    }

    /// Looks up a cookie by name.
    #[inline]
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// `Origin` (RFC 6455) or `Sec-WebSocket-Origin` (Hybi-10) header.
    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        self.param(HEADER_ORIGIN)
            .or_else(|| self.param(HEADER_LEGACY_ORIGIN))
    }

    /// `Sec-WebSocket-Key` header.
    #[inline]
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.param(HEADER_KEY)
    }

    /// Protocol generation the request asked for, `None` if unknown.
    #[inline]
    #[must_use]
    pub fn requested_version(&self) -> Option<ProtocolVersion> {
        ProtocolVersion::from_requested(self.version)
    }

    /// Absolute URL of the request, e.g. `ws://host/chat?room=1`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Url`] if host or path do not form a valid URL.
    pub fn url(&self) -> Result<Url> {
        let url = Url::parse(&format!("{}://{}{}", self.scheme, self.host, self.path))?;
        Ok(url)
    }

    /// Decoded query string pairs of the request path.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url()
            .map(|url| url.query_pairs().into_owned().collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
