//! Opening handshake processors.
//!
//! Each processor accumulates raw bytes into the connection token until a
//! complete upgrade request is available, parses it into
//! [`HandshakeData`], and produces the response bytes.
//!
//! # Strategies
//!
//! | Processor | Accept key | Extra input |
//! |-----------|------------|-------------|
//! | [`Hybi00HandshakeProcessor`] | MD5 of `Key1`/`Key2`/nonce, raw bytes | 8-byte nonce after headers |
//! | [`Hybi10HandshakeProcessor`] | `base64(SHA1(key + GUID))` | none |
//! | [`Rfc6455HandshakeProcessor`] | same as Hybi-10 | none |
//!
//! Hybi-10 and RFC 6455 processors hand requests without a version header
//! (or a version below 8) to the Hybi-00 path, so one listener serves every
//! generation up to its configured one.

// ============================================================================
// Submodules
// ============================================================================

mod hybi00;
mod hybi10;

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::handshake::{HEADER_CONNECTION, HEADER_UPGRADE};
use crate::protocol::{HandshakeData, ProtocolVersion, Scheme};

use super::ConnectionToken;

// ============================================================================
// Re-exports
// ============================================================================

pub use hybi00::Hybi00HandshakeProcessor;
pub use hybi10::{Hybi10HandshakeProcessor, Rfc6455HandshakeProcessor, accept_key};

// ============================================================================
// Constants
// ============================================================================

/// End of an HTTP request head.
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Default cap on the request head size.
pub const DEFAULT_MAX_HANDSHAKE_SIZE: usize = 8 * 1024;

// ============================================================================
// HandshakeOutcome
// ============================================================================

/// Result of feeding bytes to a handshake processor.
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// The request is incomplete; read more bytes.
    Wait,
    /// The handshake completed.
    Success {
        /// Generation negotiated for the connection.
        version: ProtocolVersion,
        /// Response bytes to write before anything else.
        response: Vec<u8>,
        /// Bytes received after the request, to be decoded as frames.
        trailing: Vec<u8>,
    },
    /// The request was rejected; close without a response.
    Close(Error),
}

// ============================================================================
// HandshakeSettings
// ============================================================================

/// Listener-wide knobs shared by all handshake processors.
#[derive(Debug, Clone)]
pub struct HandshakeSettings {
    /// Newest generation the listener speaks.
    pub version: ProtocolVersion,
    /// Oldest generation the listener accepts.
    pub min_version: ProtocolVersion,
    /// Maximum size of the request head in bytes.
    pub max_size: usize,
    /// Sub-protocols the server supports. Empty accepts the client's first.
    pub protocols: Vec<String>,
    /// Scheme clients use to reach the listener.
    pub scheme: Scheme,
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::Rfc6455,
            min_version: ProtocolVersion::Hybi00,
            max_size: DEFAULT_MAX_HANDSHAKE_SIZE,
            protocols: Vec::new(),
            scheme: Scheme::Ws,
        }
    }
}

// ============================================================================
// HandshakeProcessor
// ============================================================================

/// Strategy for one protocol generation's opening handshake.
pub trait HandshakeProcessor: Send + Sync {
    /// Newest generation this processor negotiates.
    fn version(&self) -> ProtocolVersion;

    /// Feeds newly received bytes.
    ///
    /// Partial requests are buffered in `token` and yield
    /// [`HandshakeOutcome::Wait`]; any split of the request bytes produces
    /// the same result as a single chunk.
    fn receive(&self, token: &mut ConnectionToken, bytes: &[u8]) -> HandshakeOutcome;

    /// Client side: checks a server's response against `request`.
    fn check_sign_key(&self, request: &HandshakeData, response: &[u8]) -> bool;
}

/// Creates the processor for the listener's configured generation.
#[must_use]
pub fn handshake_processor(settings: HandshakeSettings) -> Box<dyn HandshakeProcessor> {
    match settings.version {
        ProtocolVersion::Hybi00 => Box::new(Hybi00HandshakeProcessor::new(settings)),
        ProtocolVersion::Hybi10 => Box::new(Hybi10HandshakeProcessor::new(settings)),
        ProtocolVersion::Rfc6455 => Box::new(Rfc6455HandshakeProcessor::new(settings)),
    }
}

// ============================================================================
// Request Accumulation
// ============================================================================

/// Appends `bytes` and parses the request head once it is complete.
///
/// Returns the head length (terminator included) once parsed, `None` while
/// more bytes are needed.
pub(crate) fn read_request(
    token: &mut ConnectionToken,
    bytes: &[u8],
    settings: &HandshakeSettings,
) -> Result<Option<usize>> {
    let searched = token.handshake_buffer.len().saturating_sub(HEADER_TERMINATOR.len() - 1);
    token.handshake_buffer.extend_from_slice(bytes);

    if let Some(len) = token.header_len {
        return Ok(Some(len));
    }

    let Some(len) = find_terminator(&token.handshake_buffer, searched) else {
        if token.handshake_buffer.len() > settings.max_size {
            return Err(Error::handshake(format!(
                "request head exceeds {} bytes",
                settings.max_size
            )));
        }
        return Ok(None);
    };

    if len > settings.max_size {
        return Err(Error::handshake(format!(
            "request head exceeds {} bytes",
            settings.max_size
        )));
    }

    let head = std::str::from_utf8(&token.handshake_buffer[..len])
        .map_err(|_| Error::handshake("request head is not valid UTF-8"))?;
    token.handshake = parse_request(head, settings.scheme)?;
    token.header_len = Some(len);

    trace!(len, "Request head parsed");
    Ok(Some(len))
}

/// Index just past `\r\n\r\n`, searching from `from`.
pub(crate) fn find_terminator(buffer: &[u8], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
        .map(|pos| from + pos + HEADER_TERMINATOR.len())
}

// ============================================================================
// Request Parsing
// ============================================================================

/// Parses a request head into [`HandshakeData`].
///
/// # Errors
///
/// Returns [`Error::Handshake`] for a malformed request line, a
/// non-numeric version, or a missing `Upgrade`/`Connection` header.
pub fn parse_request(head: &str, scheme: Scheme) -> Result<HandshakeData> {
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path), Some(http_version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::handshake(format!(
            "malformed request line: {request_line:?}"
        )));
    };

    let mut data = HandshakeData {
        method: method.to_string(),
        path: path.to_string(),
        http_version: http_version.to_string(),
        scheme,
        ..Default::default()
    };

    for line in lines.filter(|line| !line.is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            trace!(line, "Skipping header line without colon");
            continue;
        };
        let (name, value) = (name.trim(), value.trim());

        if name.eq_ignore_ascii_case("Host") {
            data.host = value.to_string();
        } else if name.eq_ignore_ascii_case("Sec-WebSocket-Version") {
            data.version = value
                .parse()
                .map_err(|_| Error::handshake(format!("invalid version header: {value:?}")))?;
        } else if name.eq_ignore_ascii_case("Sec-WebSocket-Protocol") {
            data.requested_protocols.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from),
            );
        } else if name.eq_ignore_ascii_case("Cookie") {
            parse_cookies(value, &mut data.cookies);
        } else {
            data.params.insert(name.to_string(), value.to_string());
        }
    }

    if !data.has_param(HEADER_UPGRADE) || !data.has_param(HEADER_CONNECTION) {
        return Err(Error::handshake("missing Upgrade or Connection header"));
    }

    Ok(data)
}

/// Splits a `Cookie` header into percent-decoded pairs.
fn parse_cookies(header: &str, cookies: &mut FxHashMap<String, String>) {
    for pair in header.split(';') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let decoded = urlencoding::decode(value)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| value.to_string());
        cookies.insert(key.to_string(), decoded);
    }
}

// ============================================================================
// Negotiation
// ============================================================================

/// Picks the generation for a parsed request.
pub(crate) fn negotiate_version(
    data: &HandshakeData,
    settings: &HandshakeSettings,
) -> Result<ProtocolVersion> {
    let requested = data.requested_version().ok_or_else(|| {
        Error::handshake(format!("unsupported WebSocket version {}", data.version))
    })?;
    let version = requested.min(settings.version);
    if version < settings.min_version {
        return Err(Error::handshake(format!(
            "{version} is below the minimum {}",
            settings.min_version
        )));
    }
    Ok(version)
}

/// Picks the sub-protocol: the first client value the server supports.
pub(crate) fn negotiate_protocol(requested: &[String], supported: &[String]) -> Option<String> {
    if supported.is_empty() {
        return requested.first().cloned();
    }
    requested
        .iter()
        .find(|candidate| supported.iter().any(|s| s == *candidate))
        .cloned()
}

// ============================================================================
// Response Parsing
// ============================================================================

/// Parsed head of a handshake response (client side).
pub(crate) struct ResponseHead<'a> {
    pub status_line: &'a str,
    pub headers: Vec<(&'a str, &'a str)>,
    pub len: usize,
}

impl ResponseHead<'_> {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }
}

pub(crate) fn parse_response_head(response: &[u8]) -> Option<ResponseHead<'_>> {
    let len = find_terminator(response, 0)?;
    let head = std::str::from_utf8(&response[..len]).ok()?;
    let mut lines = head.split("\r\n");
    let status_line = lines.next()?;
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim(), value.trim()))
        .collect();
    Some(ResponseHead {
        status_line,
        headers,
        len,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &str = "GET /chat HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";

    #[test]
    fn test_find_terminator() {
        assert_eq!(find_terminator(b"ab\r\n\r\ncd", 0), Some(6));
        assert_eq!(find_terminator(b"ab\r\n\r", 0), None);
        assert_eq!(find_terminator(b"ab", 10), None);
    }

    #[test]
    fn test_parse_request_fields() {
        let data = parse_request(REQUEST, Scheme::Ws).expect("valid request");
        assert_eq!(data.method, "GET");
        assert_eq!(data.path, "/chat");
        assert_eq!(data.http_version, "HTTP/1.1");
        assert_eq!(data.host, "x");
        assert_eq!(data.version, 13);
        assert_eq!(data.key(), Some("dGhlIHNhbXBsZSBub25jZQ=="));
        assert!(!data.handshaked);
    }

    #[test]
    fn test_parse_request_cookies_and_protocols() {
        let head = "GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nCookie: sid=a%20b; theme=dark\r\nSec-WebSocket-Protocol: chat, superchat\r\n\r\n";
        let data = parse_request(head, Scheme::Wss).expect("valid request");
        assert_eq!(data.cookie("sid"), Some("a b"));
        assert_eq!(data.cookie("theme"), Some("dark"));
        assert_eq!(data.requested_protocols, vec!["chat", "superchat"]);
        assert_eq!(data.scheme, Scheme::Wss);
    }

    #[test]
    fn test_parse_request_requires_upgrade_and_connection() {
        let head = "GET / HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\n\r\n";
        assert!(parse_request(head, Scheme::Ws).is_err());
        let head = "GET / HTTP/1.1\r\nHost: x\r\nConnection: Upgrade\r\n\r\n";
        assert!(parse_request(head, Scheme::Ws).is_err());
    }

    #[test]
    fn test_parse_request_malformed_line() {
        let head = "GET /only-two\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";
        let err = parse_request(head, Scheme::Ws).unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
    }

    #[test]
    fn test_negotiate_protocol() {
        let requested = vec!["chat".to_string(), "superchat".to_string()];
        assert_eq!(negotiate_protocol(&requested, &[]), Some("chat".into()));
        assert_eq!(
            negotiate_protocol(&requested, &["superchat".to_string()]),
            Some("superchat".into())
        );
        assert_eq!(negotiate_protocol(&requested, &["mqtt".to_string()]), None);
        assert_eq!(negotiate_protocol(&[], &[]), None);
    }

    #[test]
    fn test_negotiate_version_caps_and_floors() {
        let mut data = HandshakeData {
            version: 13,
            ..Default::default()
        };
        let settings = HandshakeSettings {
            version: ProtocolVersion::Hybi10,
            ..Default::default()
        };
        assert_eq!(negotiate_version(&data, &settings).ok(), Some(ProtocolVersion::Hybi10));

        data.version = 0;
        let settings = HandshakeSettings {
            min_version: ProtocolVersion::Hybi10,
            ..Default::default()
        };
        assert!(negotiate_version(&data, &settings).is_err());

        data.version = 14;
        assert!(negotiate_version(&data, &HandshakeSettings::default()).is_err());
    }

    #[test]
    fn test_read_request_rejects_oversized_head() {
        let settings = HandshakeSettings {
            max_size: 16,
            ..Default::default()
        };
        let mut token = ConnectionToken::new();
        assert!(read_request(&mut token, REQUEST.as_bytes(), &settings).is_err());
    }

    #[test]
    fn test_parse_response_head() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\nrest";
        let head = parse_response_head(response).expect("complete head");
        assert_eq!(head.status_line, "HTTP/1.1 101 Switching Protocols");
        assert_eq!(head.header("upgrade"), Some("websocket"));
        assert_eq!(&response[head.len..], b"rest");
    }
}
