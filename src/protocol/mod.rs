//! WebSocket wire-level value types.
//!
//! This module defines the immutable data exchanged between the handshake
//! and frame processors and the application.
//!
//! # Protocol Overview
//!
//! | Generation | Handshake key | Framing |
//! |------------|---------------|---------|
//! | Hybi-00 | MD5 over `Key1`/`Key2` + 8-byte nonce | `0x00 <payload> 0xFF` |
//! | Hybi-10 | `base64(SHA1(key + GUID))` | binary header + optional mask |
//! | RFC 6455 | same as Hybi-10 | same as Hybi-10, wider close codes |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `close` | Close codes and close payloads |
//! | `frame` | Opcodes, frame headers and masking |
//! | `handshake` | Parsed upgrade request |
//! | `message` | Completed application messages |
//! | `version` | Protocol generations and URI schemes |

// ============================================================================
// Submodules
// ============================================================================

/// Close codes and close frame payloads.
pub mod close;

/// Frame header view, segments and masking.
pub mod frame;

/// Parsed upgrade request.
pub mod handshake;

/// Completed messages and text encodings.
pub mod message;

/// Protocol generations.
pub mod version;

// ============================================================================
// Re-exports
// ============================================================================

pub use close::{CloseReason, close_code};
pub use frame::{DataSegmentFrame, MessageHeadFrame, Opcode, apply_mask};
pub use handshake::HandshakeData;
pub use message::{DataMessage, TextEncoding};
pub use version::{ProtocolVersion, Scheme};
