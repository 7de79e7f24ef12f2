//! WebSocket Engine - Server-side WebSocket for Hybi-00, Hybi-10 and RFC 6455.
//!
//! This library accepts raw TCP connections, performs the opening handshake
//! of whichever protocol generation the client speaks, decodes and encodes
//! frames, and reports connection events to the application.
//!
//! # Architecture
//!
//! The engine is split into pure protocol processors and an async I/O pump:
//!
//! - **Processors**: Sans-I/O state machines fed with arbitrary byte chunks
//!   through a per-connection [`ConnectionToken`]
//! - **Transport**: Tokio tasks that read sockets, lease pooled buffers and
//!   drain each connection's send queue in order
//! - **Listener**: Accept loop, connection registry and a sweep that expires
//!   stalled opening and closing handshakes
//!
//! # Quick Start
//!
//! ```no_run
//! use websocket_engine::{Listener, ListenerEvent, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let listener = Listener::builder()
//!         .bind("127.0.0.1:8080")
//!         .on_event(|event| {
//!             if let ListenerEvent::DataReceived { connection, message } = event {
//!                 // Echo every message back
//!                 connection.send_binary(message.payload())?;
//!             }
//!             Ok(())
//!         })
//!         .build()?;
//!
//!     let addr = listener.start().await?;
//!     println!("Listening on {addr}");
//!
//!     tokio::signal::ctrl_c().await?;
//!     listener.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Connection identifiers |
//! | [`processor`] | Handshake and message processors |
//! | [`protocol`] | Wire-level value types |
//! | [`server`] | [`Listener`], builder, options and events |
//! | [`transport`] | [`Connection`] handle and buffer pools |
//!
//! # Supported Protocols
//!
//! | Version | `Sec-WebSocket-Version` | Notes |
//! |---------|-------------------------|-------|
//! | Hybi-00 | absent | Sentinel framing, no ping/pong |
//! | Hybi-10 | 8 | Binary framing |
//! | RFC 6455 | 13 | Binary framing, full close-code range |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Handshake and message processors.
///
/// Pure state machines with no I/O; usable without the listener.
pub mod processor;

/// WebSocket wire-level value types.
pub mod protocol;

/// WebSocket listener.
///
/// Use [`Listener::builder()`] to create a configured listener instance.
pub mod server;

/// Socket-level plumbing.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::ConnectionId;

// Protocol types
pub use protocol::{
    CloseReason, DataMessage, HandshakeData, Opcode, ProtocolVersion, Scheme, TextEncoding,
    close_code,
};

// Processor types
pub use processor::{
    ConnectionToken, FrameSettings, HandshakeOutcome, HandshakeProcessor, HandshakeSettings,
    MessageProcessor, ReadOutcome, handshake_processor, message_processor,
};

// Listener types
pub use server::{EventHandler, Listener, ListenerBuilder, ListenerEvent, ListenerOptions};

// Transport types
pub use transport::{BufferPool, Connection, ConnectionState, PooledBuffer};
