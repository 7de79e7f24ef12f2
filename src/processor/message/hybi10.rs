//! Hybi-10 and RFC 6455 binary framing.
//!
//! ```text
//!  0               1               2               3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |            (16/64)            |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                 Masking-key (0 or 4 bytes)    |  Payload ...  |
//! +-----------------------------------------------+---------------+
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::mem;

use tracing::trace;

use crate::error::{Error, Result};
use crate::processor::ConnectionToken;
use crate::processor::token::FrameStage;
use crate::protocol::{
    CloseReason, DataMessage, DataSegmentFrame, MessageHeadFrame, Opcode, ProtocolVersion,
    apply_mask,
};

use super::hybi00::Hybi00MessageProcessor;
use super::{FrameSettings, MessageProcessor, ReadOutcome, close_payload};

// ============================================================================
// Constants
// ============================================================================

/// Largest control frame payload.
const MAX_CONTROL_PAYLOAD: usize = 125;

/// Largest length encoded in the 7-bit field.
const MAX_SHORT_LEN: usize = 125;

/// Payload bytes reserved when a frame header arrives; the rest grows with
/// received data.
const INITIAL_PAYLOAD_CAPACITY: u64 = 4096;

// ============================================================================
// Hybi10MessageProcessor
// ============================================================================

/// Binary framing for Hybi-10 peers.
#[derive(Debug, Clone)]
pub struct Hybi10MessageProcessor {
    settings: FrameSettings,
    version: ProtocolVersion,
    legacy: Hybi00MessageProcessor,
}

impl Hybi10MessageProcessor {
    /// Creates the processor.
    #[must_use]
    pub fn new(settings: FrameSettings) -> Self {
        Self::with_version(settings, ProtocolVersion::Hybi10)
    }

    fn with_version(settings: FrameSettings, version: ProtocolVersion) -> Self {
        Self {
            settings,
            version,
            legacy: Hybi00MessageProcessor::new(settings),
        }
    }
}

impl MessageProcessor for Hybi10MessageProcessor {
    fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn try_read_message(&self, token: &mut ConnectionToken, bytes: &[u8]) -> Result<ReadOutcome> {
        if token.version() == Some(ProtocolVersion::Hybi00) {
            return self.legacy.try_read_message(token, bytes);
        }

        token.record_bytes(bytes.len());
        let messages = decode_frames(token, bytes, self.version, self.settings.max_message_size)?;
        token.record_messages(messages.len());
        Ok(ReadOutcome {
            complete: token.is_idle(),
            messages,
        })
    }

    fn build_frame(&self, opcode: Opcode, payload: &[u8]) -> Result<Vec<u8>> {
        encode_frame(opcode, payload, self.settings.mask_outgoing)
    }

    fn build_close_frame(&self, code: u16, reason: &str) -> Vec<u8> {
        let payload = close_payload(code, reason);
        encode_frame(Opcode::Close, &payload, self.settings.mask_outgoing).unwrap_or_default()
    }
}

// ============================================================================
// Rfc6455MessageProcessor
// ============================================================================

/// RFC 6455 framing: Hybi-10 wire format with the wider close code range.
#[derive(Debug, Clone)]
pub struct Rfc6455MessageProcessor {
    inner: Hybi10MessageProcessor,
}

impl Rfc6455MessageProcessor {
    /// Creates the processor.
    #[must_use]
    pub fn new(settings: FrameSettings) -> Self {
        Self {
            inner: Hybi10MessageProcessor::with_version(settings, ProtocolVersion::Rfc6455),
        }
    }
}

impl MessageProcessor for Rfc6455MessageProcessor {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::Rfc6455
    }

    fn try_read_message(&self, token: &mut ConnectionToken, bytes: &[u8]) -> Result<ReadOutcome> {
        self.inner.try_read_message(token, bytes)
    }

    fn build_frame(&self, opcode: Opcode, payload: &[u8]) -> Result<Vec<u8>> {
        self.inner.build_frame(opcode, payload)
    }

    fn build_close_frame(&self, code: u16, reason: &str) -> Vec<u8> {
        self.inner.build_close_frame(code, reason)
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encodes a single final frame with minimal length encoding.
pub(crate) fn encode_frame(opcode: Opcode, payload: &[u8], mask: bool) -> Result<Vec<u8>> {
    if opcode == Opcode::Continuation {
        return Err(Error::protocol("cannot send a bare continuation frame"));
    }
    if opcode.is_control() && payload.len() > MAX_CONTROL_PAYLOAD {
        return Err(Error::protocol(format!(
            "{opcode} payload of {} bytes exceeds {MAX_CONTROL_PAYLOAD}",
            payload.len()
        )));
    }

    let len = payload.len();
    let mask_bit = if mask { 0x80 } else { 0x00 };
    let mut frame = Vec::with_capacity(len + 14);
    frame.push(0x80 | opcode.as_u8());

    if len <= MAX_SHORT_LEN {
        frame.push(mask_bit | len as u8);
    } else if let Ok(short) = u16::try_from(len) {
        frame.push(mask_bit | 126);
        frame.extend_from_slice(&short.to_be_bytes());
    } else {
        frame.push(mask_bit | 127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }

    if mask {
        let key: [u8; 4] = rand::random();
        frame.extend_from_slice(&key);
        let start = frame.len();
        frame.extend_from_slice(payload);
        apply_mask(&mut frame[start..], key);
    } else {
        frame.extend_from_slice(payload);
    }

    Ok(frame)
}

// ============================================================================
// Decoding
// ============================================================================

/// Runs the frame state machine over `bytes`, resuming from `token`.
pub(crate) fn decode_frames(
    token: &mut ConnectionToken,
    mut bytes: &[u8],
    version: ProtocolVersion,
    max_message_size: usize,
) -> Result<Vec<DataMessage>> {
    let mut messages = Vec::new();

    loop {
        if token.stage == FrameStage::Payload && token.payload.len() as u64 == token.payload_len {
            if let Some(message) = finish_frame(token, version)? {
                messages.push(message);
            }
            continue;
        }
        if bytes.is_empty() {
            break;
        }

        match token.stage {
            FrameStage::Header => {
                bytes = fill(&mut token.head_bytes, &mut token.head_filled, bytes);
                if token.head_filled < token.head_bytes.len() {
                    continue;
                }
                let head = MessageHeadFrame::parse(token.head_bytes);
                check_head(token, &head)?;
                token.head = Some(head);
                token.length_size = head.extended_length_size();
                if token.length_size == 0 {
                    token.payload_len = u64::from(head.payload_len);
                    begin_payload(token, &head, max_message_size)?;
                } else {
                    token.stage = FrameStage::ExtendedLength;
                }
            }
            FrameStage::ExtendedLength => {
                let size = token.length_size;
                bytes = fill(&mut token.length_bytes[..size], &mut token.length_filled, bytes);
                if token.length_filled < size {
                    continue;
                }
                token.payload_len = extended_length(&token.length_bytes[..size])?;
                let head = token
                    .head
                    .ok_or_else(|| Error::protocol("extended length without a header"))?;
                begin_payload(token, &head, max_message_size)?;
            }
            FrameStage::MaskKey => {
                bytes = fill(&mut token.mask, &mut token.mask_filled, bytes);
                if token.mask_filled == token.mask.len() {
                    token.stage = FrameStage::Payload;
                }
            }
            FrameStage::Payload => {
                let remaining = token.payload_len - token.payload.len() as u64;
                let take = usize::try_from(remaining).map_or(bytes.len(), |r| r.min(bytes.len()));
                token.payload.extend_from_slice(&bytes[..take]);
                bytes = &bytes[take..];
            }
        }
    }

    Ok(messages)
}

/// Copies as much of `src` as fits into `dest[*filled..]`.
fn fill<'a>(dest: &mut [u8], filled: &mut usize, src: &'a [u8]) -> &'a [u8] {
    let take = (dest.len() - *filled).min(src.len());
    dest[*filled..*filled + take].copy_from_slice(&src[..take]);
    *filled += take;
    &src[take..]
}

fn extended_length(bytes: &[u8]) -> Result<u64> {
    match *bytes {
        [hi, lo] => Ok(u64::from(u16::from_be_bytes([hi, lo]))),
        [a, b, c, d, e, f, g, h] => {
            let len = u64::from_be_bytes([a, b, c, d, e, f, g, h]);
            if len >> 63 != 0 {
                return Err(Error::protocol("64-bit payload length has its high bit set"));
            }
            Ok(len)
        }
        _ => Err(Error::protocol("invalid extended length size")),
    }
}

/// Validates a header against the frame rules and the fragmentation state.
fn check_head(token: &ConnectionToken, head: &MessageHeadFrame) -> Result<()> {
    if head.has_reserved_bits() {
        return Err(Error::protocol(format!("reserved bits set: 0b{:03b}", head.rsv)));
    }
    let opcode = head
        .opcode()
        .ok_or_else(|| Error::protocol(format!("unknown opcode 0x{:X}", head.opcode)))?;

    if opcode.is_control() {
        if !head.fin {
            return Err(Error::protocol(format!("fragmented {opcode} frame")));
        }
        if head.payload_len as usize > MAX_CONTROL_PAYLOAD {
            return Err(Error::protocol(format!(
                "{opcode} payload exceeds {MAX_CONTROL_PAYLOAD} bytes"
            )));
        }
    } else if opcode == Opcode::Continuation {
        if token.segments.is_empty() {
            return Err(Error::protocol("continuation frame without a started message"));
        }
    } else if !token.segments.is_empty() {
        return Err(Error::protocol(format!(
            "{opcode} frame while a fragmented message is in progress"
        )));
    }

    Ok(())
}

/// Enforces the size cap and moves to the mask or payload stage.
fn begin_payload(
    token: &mut ConnectionToken,
    head: &MessageHeadFrame,
    max_message_size: usize,
) -> Result<()> {
    if !head.opcode().is_some_and(Opcode::is_control) {
        let buffered: u64 = token
            .segments
            .iter()
            .map(|segment| segment.payload.len() as u64)
            .sum();
        let total = buffered + token.payload_len;
        if total > max_message_size as u64 {
            return Err(Error::message_too_large(total, max_message_size));
        }
    }

    let reserve = token.payload_len.min(INITIAL_PAYLOAD_CAPACITY);
    token.payload = Vec::with_capacity(reserve as usize);
    token.stage = if head.masked {
        FrameStage::MaskKey
    } else {
        FrameStage::Payload
    };
    Ok(())
}

/// Unmasks the finished frame and either emits a message or stores a segment.
fn finish_frame(token: &mut ConnectionToken, version: ProtocolVersion) -> Result<Option<DataMessage>> {
    let head = token
        .head
        .ok_or_else(|| Error::protocol("payload without a header"))?;
    let mask = token.mask;
    let mut payload = mem::take(&mut token.payload);
    token.reset_frame();

    if head.masked {
        apply_mask(&mut payload, mask);
    }

    let opcode = head
        .opcode()
        .ok_or_else(|| Error::protocol(format!("unknown opcode 0x{:X}", head.opcode)))?;
    trace!(%opcode, fin = head.fin, len = payload.len(), "Frame decoded");

    if opcode.is_control() {
        if opcode == Opcode::Close {
            CloseReason::parse(&payload, version)?;
        }
        return Ok(Some(DataMessage::new(opcode, payload)));
    }

    if !head.fin {
        token.segments.push(DataSegmentFrame { head, payload });
        return Ok(None);
    }

    if token.segments.is_empty() {
        return Ok(Some(DataMessage::new(opcode, payload)));
    }

    let segments = mem::take(&mut token.segments);
    let logical = segments
        .first()
        .and_then(|segment| segment.head.opcode())
        .unwrap_or(opcode);
    let total = segments.iter().map(|s| s.payload.len()).sum::<usize>() + payload.len();
    let mut assembled = Vec::with_capacity(total);
    for segment in segments {
        assembled.extend_from_slice(&segment.payload);
    }
    assembled.extend_from_slice(&payload);

    Ok(Some(DataMessage::new(logical, assembled)))
}

// ============================================================================
// Tests
// ============================================================================
