//! Frame processors.
//!
//! | Processor | Framing | Close codes |
//! |-----------|---------|-------------|
//! | [`Hybi00MessageProcessor`] | `0x00 .. 0xFF` text, `0xFF 0x00` close | 1000..=1010 |
//! | [`Hybi10MessageProcessor`] | binary header, optional mask | 1000..=1010 |
//! | [`Rfc6455MessageProcessor`] | same as Hybi-10 | 1000..=1011, 1015, 3000..=4999 |

// ============================================================================
// Submodules
// ============================================================================

mod hybi00;
mod hybi10;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::protocol::{CloseReason, DataMessage, Opcode, ProtocolVersion};

use super::ConnectionToken;

// ============================================================================
// Re-exports
// ============================================================================

pub use hybi00::Hybi00MessageProcessor;
pub use hybi10::{Hybi10MessageProcessor, Rfc6455MessageProcessor};

// ============================================================================
// Constants
// ============================================================================

/// Default cap on a reassembled message (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

// ============================================================================
// ReadOutcome
// ============================================================================

/// Messages decoded from one batch of bytes.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReadOutcome {
    /// `true` when every byte was consumed into finished messages, i.e. no
    /// frame or fragmented message is left half-assembled.
    pub complete: bool,
    /// Completed messages in wire order.
    pub messages: Vec<DataMessage>,
}

// ============================================================================
// FrameSettings
// ============================================================================

/// Framing knobs shared by all message processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSettings {
    /// Mask outgoing frames with a random key.
    pub mask_outgoing: bool,
    /// Largest accepted message in bytes.
    pub max_message_size: usize,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            mask_outgoing: false,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

// ============================================================================
// MessageProcessor
// ============================================================================

/// Strategy for one protocol generation's framing.
pub trait MessageProcessor: Send + Sync + fmt::Debug {
    /// Generation this processor frames.
    fn version(&self) -> ProtocolVersion;

    /// Decodes as many messages as `bytes` completes.
    ///
    /// Partial frames stay in `token`; feeding the same bytes in any
    /// chunking yields the same messages.
    ///
    /// # Errors
    ///
    /// Returns a protocol error when the peer violates framing rules. The
    /// connection must be closed afterwards; see [`crate::Error::close_code`].
    fn try_read_message(&self, token: &mut ConnectionToken, bytes: &[u8]) -> Result<ReadOutcome>;

    /// Encodes one unfragmented frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the generation cannot carry `opcode` or `payload`.
    fn build_frame(&self, opcode: Opcode, payload: &[u8]) -> Result<Vec<u8>>;

    /// Encodes a close frame.
    fn build_close_frame(&self, code: u16, reason: &str) -> Vec<u8>;

    /// Returns `true` if `code` may appear in a close frame.
    fn is_valid_close_code(&self, code: u16) -> bool {
        self.version().is_valid_close_code(code)
    }
}

/// Creates the processor for a negotiated generation.
#[must_use]
pub fn message_processor(
    version: ProtocolVersion,
    settings: FrameSettings,
) -> Arc<dyn MessageProcessor> {
    match version {
        ProtocolVersion::Hybi00 => Arc::new(Hybi00MessageProcessor::new(settings)),
        ProtocolVersion::Hybi10 => Arc::new(Hybi10MessageProcessor::new(settings)),
        ProtocolVersion::Rfc6455 => Arc::new(Rfc6455MessageProcessor::new(settings)),
    }
}

/// Close payload for `code` and `reason`.
fn close_payload(code: u16, reason: &str) -> Vec<u8> {
    CloseReason::new(code, reason).encode()
}
