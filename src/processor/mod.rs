//! Per-generation protocol strategies.
//!
//! A [`ProtocolVersion`](crate::protocol::ProtocolVersion) selects one
//! [`HandshakeProcessor`] and one [`MessageProcessor`]. Both are stateless;
//! all decode state lives in the [`ConnectionToken`] owned by the
//! connection's receive task.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `handshake` | Opening handshake parsing and response |
//! | `message` | Frame decoding and encoding |
//! | `token` | Per-connection decode state |

// ============================================================================
// Submodules
// ============================================================================

/// Opening handshake processors.
pub mod handshake;

/// Frame processors.
pub mod message;

mod token;

// ============================================================================
// Re-exports
// ============================================================================

pub use handshake::{
    DEFAULT_MAX_HANDSHAKE_SIZE, HandshakeOutcome, HandshakeProcessor, HandshakeSettings,
    handshake_processor,
};
pub use message::{
    DEFAULT_MAX_MESSAGE_SIZE, FrameSettings, MessageProcessor, ReadOutcome, message_processor,
};
pub use token::ConnectionToken;
