//! Hybi-10 and RFC 6455 handshake.

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Write as _;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::error::{Error, Result};
use crate::processor::ConnectionToken;
use crate::protocol::{HandshakeData, ProtocolVersion};

use super::{
    Hybi00HandshakeProcessor, HandshakeOutcome, HandshakeProcessor, HandshakeSettings,
    negotiate_protocol, negotiate_version, parse_response_head, read_request,
};

// ============================================================================
// Constants
// ============================================================================

/// GUID appended to the client key before hashing.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes `Sec-WebSocket-Accept` for a client key.
#[must_use]
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

// ============================================================================
// Hybi10HandshakeProcessor
// ============================================================================

/// Handshake for `Sec-WebSocket-Key` clients.
///
/// Requests without a version header (or below 8) take the Hybi-00 path.
#[derive(Debug, Clone)]
pub struct Hybi10HandshakeProcessor {
    settings: HandshakeSettings,
    legacy: Hybi00HandshakeProcessor,
}

impl Hybi10HandshakeProcessor {
    /// Creates the processor.
    #[must_use]
    pub fn new(settings: HandshakeSettings) -> Self {
        Self {
            legacy: Hybi00HandshakeProcessor::new(settings.clone()),
            settings,
        }
    }

    fn respond(&self, data: &mut HandshakeData) -> Result<(ProtocolVersion, Vec<u8>)> {
        let version = negotiate_version(data, &self.settings)?;
        let key = data
            .key()
            .ok_or_else(|| Error::handshake("missing Sec-WebSocket-Key"))?;
        let accept = accept_key(key);

        data.protocol = negotiate_protocol(&data.requested_protocols, &self.settings.protocols);

        let mut head = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {accept}\r\n"
        );
        if version == ProtocolVersion::Hybi10
            && let Some(origin) = data.origin()
        {
            let _ = write!(head, "Sec-WebSocket-Origin: {origin}\r\n");
        }
        if let Some(protocol) = &data.protocol {
            let _ = write!(head, "Sec-WebSocket-Protocol: {protocol}\r\n");
        }
        head.push_str("\r\n");

        Ok((version, head.into_bytes()))
    }
}

impl HandshakeProcessor for Hybi10HandshakeProcessor {
    fn version(&self) -> ProtocolVersion {
        self.settings.version
    }

    fn receive(&self, token: &mut ConnectionToken, bytes: &[u8]) -> HandshakeOutcome {
        let header_len = match read_request(token, bytes, &self.settings) {
            Ok(Some(len)) => len,
            Ok(None) => return HandshakeOutcome::Wait,
            Err(e) => return HandshakeOutcome::Close(e),
        };

        if token.handshake.version < ProtocolVersion::Hybi10.wire_version() {
            return self.legacy.complete(token, header_len);
        }

        match self.respond(&mut token.handshake) {
            Ok((version, response)) => {
                let trailing = token.finish_handshake(version, header_len);
                debug!(
                    path = %token.handshake.path,
                    %version,
                    protocol = ?token.handshake.protocol,
                    "Handshake complete"
                );
                HandshakeOutcome::Success {
                    version,
                    response,
                    trailing,
                }
            }
            Err(e) => HandshakeOutcome::Close(e),
        }
    }

    fn check_sign_key(&self, request: &HandshakeData, response: &[u8]) -> bool {
        if request.version < ProtocolVersion::Hybi10.wire_version() {
            return self.legacy.check_sign_key(request, response);
        }
        let Some(key) = request.key() else {
            return false;
        };
        let Some(head) = parse_response_head(response) else {
            return false;
        };
        head.status_line.split_whitespace().nth(1) == Some("101")
            && head.header("Sec-WebSocket-Accept") == Some(accept_key(key).as_str())
    }
}

// ============================================================================
// Rfc6455HandshakeProcessor
// ============================================================================

/// RFC 6455 handshake; identical on the wire to Hybi-10 but negotiates up
/// to version 13.
#[derive(Debug, Clone)]
pub struct Rfc6455HandshakeProcessor {
    inner: Hybi10HandshakeProcessor,
}

impl Rfc6455HandshakeProcessor {
    /// Creates the processor.
    #[must_use]
    pub fn new(settings: HandshakeSettings) -> Self {
        Self {
            inner: Hybi10HandshakeProcessor::new(HandshakeSettings {
                version: ProtocolVersion::Rfc6455,
                ..settings
            }),
        }
    }
}

impl HandshakeProcessor for Rfc6455HandshakeProcessor {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::Rfc6455
    }

    fn receive(&self, token: &mut ConnectionToken, bytes: &[u8]) -> HandshakeOutcome {
        self.inner.receive(token, bytes)
    }

    fn check_sign_key(&self, request: &HandshakeData, response: &[u8]) -> bool {
        self.inner.check_sign_key(request, response)
    }
}

// ============================================================================
// Tests
// ============================================================================
