//! Hybi-00 (draft-hixie-76) handshake.

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Write as _;

use md5::{Digest, Md5};
use tracing::debug;

use crate::error::{Error, Result};
use crate::processor::ConnectionToken;
use crate::protocol::handshake::{HEADER_KEY1, HEADER_KEY2};
use crate::protocol::{HandshakeData, ProtocolVersion};

use super::{
    HandshakeOutcome, HandshakeProcessor, HandshakeSettings, negotiate_protocol,
    negotiate_version, parse_response_head, read_request,
};

// ============================================================================
// Constants
// ============================================================================

/// Nonce bytes following the request head.
const NONCE_LEN: usize = 8;

/// Answer bytes following the response head.
const ANSWER_LEN: usize = 16;

// ============================================================================
// Hybi00HandshakeProcessor
// ============================================================================

/// Handshake for legacy clients sending `Sec-WebSocket-Key1`/`Key2`.
#[derive(Debug, Clone)]
pub struct Hybi00HandshakeProcessor {
    settings: HandshakeSettings,
}

impl Hybi00HandshakeProcessor {
    /// Creates the processor.
    #[must_use]
    pub fn new(settings: HandshakeSettings) -> Self {
        Self { settings }
    }

    /// Finishes a request whose head is `header_len` bytes long.
    ///
    /// Waits until the nonce has arrived.
    pub(crate) fn complete(&self, token: &mut ConnectionToken, header_len: usize) -> HandshakeOutcome {
        let consumed = header_len + NONCE_LEN;
        if token.handshake_buffer.len() < consumed {
            return HandshakeOutcome::Wait;
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&token.handshake_buffer[header_len..consumed]);
        token.handshake.nonce = Some(nonce);

        match self.respond(&mut token.handshake) {
            Ok(response) => {
                let trailing = token.finish_handshake(ProtocolVersion::Hybi00, consumed);
                debug!(path = %token.handshake.path, "Hybi-00 handshake complete");
                HandshakeOutcome::Success {
                    version: ProtocolVersion::Hybi00,
                    response,
                    trailing,
                }
            }
            Err(e) => HandshakeOutcome::Close(e),
        }
    }

    fn respond(&self, data: &mut HandshakeData) -> Result<Vec<u8>> {
        negotiate_version(data, &self.settings)?;

        let key1 = data
            .param(HEADER_KEY1)
            .ok_or_else(|| Error::handshake("missing Sec-WebSocket-Key1"))?;
        let key2 = data
            .param(HEADER_KEY2)
            .ok_or_else(|| Error::handshake("missing Sec-WebSocket-Key2"))?;
        let nonce = data
            .nonce
            .ok_or_else(|| Error::handshake("missing 8-byte nonce"))?;
        let answer = challenge_answer(key1, key2, &nonce)?;

        data.protocol = negotiate_protocol(&data.requested_protocols, &self.settings.protocols);

        let mut head = String::from(
            "HTTP/1.1 101 WebSocket Protocol Handshake\r\n\
             Upgrade: WebSocket\r\n\
             Connection: Upgrade\r\n",
        );
        if let Some(origin) = data.origin() {
            let _ = write!(head, "Sec-WebSocket-Origin: {origin}\r\n");
        }
        let _ = write!(
            head,
            "Sec-WebSocket-Location: {}://{}{}\r\n",
            data.scheme, data.host, data.path
        );
        if let Some(protocol) = &data.protocol {
            let _ = write!(head, "Sec-WebSocket-Protocol: {protocol}\r\n");
        }
        head.push_str("\r\n");

        let mut response = head.into_bytes();
        response.extend_from_slice(&answer);
        Ok(response)
    }
}

impl HandshakeProcessor for Hybi00HandshakeProcessor {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::Hybi00
    }

    fn receive(&self, token: &mut ConnectionToken, bytes: &[u8]) -> HandshakeOutcome {
        match read_request(token, bytes, &self.settings) {
            Ok(Some(header_len)) => self.complete(token, header_len),
            Ok(None) => HandshakeOutcome::Wait,
            Err(e) => HandshakeOutcome::Close(e),
        }
    }

    fn check_sign_key(&self, request: &HandshakeData, response: &[u8]) -> bool {
        let (Some(key1), Some(key2), Some(nonce)) = (
            request.param(HEADER_KEY1),
            request.param(HEADER_KEY2),
            request.nonce,
        ) else {
            return false;
        };
        let Some(head) = parse_response_head(response) else {
            return false;
        };
        let Some(received) = response.get(head.len..head.len + ANSWER_LEN) else {
            return false;
        };
        challenge_answer(key1, key2, &nonce).is_ok_and(|expected| expected == received)
    }
}

// ============================================================================
// Challenge
// ============================================================================

/// Computes the 16-byte MD5 challenge answer.
///
/// # Errors
///
/// Returns [`Error::Handshake`] if either key is malformed.
pub fn challenge_answer(key1: &str, key2: &str, nonce: &[u8; NONCE_LEN]) -> Result<[u8; ANSWER_LEN]> {
    let mut hasher = Md5::new();
    hasher.update(key_number(key1)?.to_be_bytes());
    hasher.update(key_number(key2)?.to_be_bytes());
    hasher.update(nonce);

    let mut answer = [0u8; ANSWER_LEN];
    answer.copy_from_slice(&hasher.finalize());
    Ok(answer)
}

/// Concatenated digits divided by the number of spaces.
fn key_number(key: &str) -> Result<u32> {
    let digits: String = key.chars().filter(char::is_ascii_digit).collect();
    let number: u64 = digits
        .parse()
        .map_err(|_| Error::handshake("key has no usable digits"))?;
    let spaces = key.chars().filter(|c| *c == ' ').count() as u64;

    if spaces == 0 {
        return Err(Error::handshake("key contains no spaces"));
    }
    if number % spaces != 0 {
        return Err(Error::handshake("key number is not a multiple of its spaces"));
    }

    u32::try_from(number / spaces).map_err(|_| Error::handshake("key number out of range"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const KEY1: &str = "18x 6]8vM;54 *(5:  {   U1]8  z [  8";
    const KEY2: &str = "1_ tx7X d  <  nw  334J702) 7]o}` 0";
    const NONCE: &[u8; 8] = b"Tm[K T2u";

    fn request() -> Vec<u8> {
        let mut bytes = format!(
            "GET /demo HTTP/1.1\r\nHost: example.com\r\nConnection: Upgrade\r\n\
             Sec-WebSocket-Key2: {KEY2}\r\nSec-WebSocket-Protocol: sample\r\n\
             Upgrade: WebSocket\r\nSec-WebSocket-Key1: {KEY1}\r\n\
             Origin: http://example.com\r\n\r\n"
        )
        .into_bytes();
        bytes.extend_from_slice(NONCE);
        bytes
    }

    fn processor() -> Hybi00HandshakeProcessor {
        Hybi00HandshakeProcessor::new(HandshakeSettings {
            version: ProtocolVersion::Hybi00,
            ..Default::default()
        })
    }

    #[test]
    fn test_key_number() {
        assert_eq!(key_number(KEY1).ok(), Some(155_712_099));
        assert_eq!(key_number(KEY2).ok(), Some(173_347_027));
        assert!(key_number("12345").is_err());
        assert_eq!(key_number("1 2 ").ok(), Some(6));
        assert!(key_number("1 3  ").is_err());
    }

    #[test]
    fn test_challenge_answer_vectors() {
        let answer = challenge_answer(KEY1, KEY2, NONCE).expect("valid keys");
        assert_eq!(&answer, b"fQJ,fN/4F4!~K~MH");

        let answer = challenge_answer("3e6b263  4 17 80", "17  9 G`ZD9   2 2b 7X 3 /r90", b"WjN}|M(6")
            .expect("valid keys");
        assert_eq!(&answer, b"n`9eBk9z$R8pOtVb");
    }

    #[test]
    fn test_receive_single_chunk() {
        let mut token = ConnectionToken::new();
        let outcome = processor().receive(&mut token, &request());
        let HandshakeOutcome::Success {
            version,
            response,
            trailing,
        } = outcome
        else {
            panic!("expected success, got {outcome:?}");
        };

        assert_eq!(version, ProtocolVersion::Hybi00);
        assert!(trailing.is_empty());
        assert!(response.starts_with(b"HTTP/1.1 101 WebSocket Protocol Handshake\r\n"));
        assert!(response.ends_with(b"\r\n\r\nfQJ,fN/4F4!~K~MH"));
        let text = String::from_utf8_lossy(&response);
        assert!(text.contains("Sec-WebSocket-Origin: http://example.com\r\n"));
        assert!(text.contains("Sec-WebSocket-Location: ws://example.com/demo\r\n"));
        assert!(text.contains("Sec-WebSocket-Protocol: sample\r\n"));
        assert!(token.is_handshaked());
        assert_eq!(token.handshake().nonce, Some(*NONCE));
    }

    #[test]
    fn test_receive_waits_for_nonce() {
        let bytes = request();
        let split = bytes.len() - 3;
        let mut token = ConnectionToken::new();
        let processor = processor();

        assert!(matches!(
            processor.receive(&mut token, &bytes[..split]),
            HandshakeOutcome::Wait
        ));
        assert!(matches!(
            processor.receive(&mut token, &bytes[split..]),
            HandshakeOutcome::Success { .. }
        ));
    }

    #[test]
    fn test_receive_any_chunking() {
        let bytes = request();
        for size in [1, 2, 7, 13, 64] {
            let mut token = ConnectionToken::new();
            let processor = processor();
            let mut outcome = HandshakeOutcome::Wait;
            for chunk in bytes.chunks(size) {
                assert!(matches!(outcome, HandshakeOutcome::Wait));
                outcome = processor.receive(&mut token, chunk);
            }
            assert!(
                matches!(outcome, HandshakeOutcome::Success { .. }),
                "chunk size {size}"
            );
        }
    }

    #[test]
    fn test_missing_key_closes() {
        let mut bytes = b"GET / HTTP/1.1\r\nHost: x\r\nUpgrade: WebSocket\r\nConnection: Upgrade\r\n\r\n".to_vec();
        bytes.extend_from_slice(NONCE);
        let mut token = ConnectionToken::new();
        assert!(matches!(
            processor().receive(&mut token, &bytes),
            HandshakeOutcome::Close(_)
        ));
    }

    #[test]
    fn test_check_sign_key() {
        let mut token = ConnectionToken::new();
        let processor = processor();
        let HandshakeOutcome::Success { response, .. } = processor.receive(&mut token, &request())
        else {
            panic!("expected success");
        };

        assert!(processor.check_sign_key(token.handshake(), &response));

        let mut forged = response.clone();
        let last = forged.len() - 1;
        forged[last] ^= 0xFF;
        assert!(!processor.check_sign_key(token.handshake(), &forged));
        assert!(!processor.check_sign_key(token.handshake(), &response[..response.len() - 4]));
    }
}
