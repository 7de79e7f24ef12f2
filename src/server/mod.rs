//! WebSocket listener.
//!
//! This module provides the main entry point for serving WebSocket clients.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Listener`] | Accept loop, connection registry and timeout sweep |
//! | [`ListenerBuilder`] | Fluent configuration builder |
//! | [`ListenerOptions`] | Limits, timeouts and protocol settings |
//! | [`ListenerEvent`] | Connection events delivered to the application |
//!
//! # Example
//!
//! ```no_run
//! use websocket_engine::{Listener, ListenerEvent, Result};
//!
//! # async fn example() -> Result<()> {
//! let listener = Listener::builder()
//!     .bind("0.0.0.0:8080")
//!     .on_event(|event| {
//!         if let ListenerEvent::Connected(connection) = event {
//!             connection.send_text("welcome")?;
//!         }
//!         Ok(())
//!     })
//!     .build()?;
//!
//! listener.start().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for listener configuration.
pub mod builder;

/// Core listener implementation.
pub mod core;

/// Listener events.
pub mod event;

/// Listener options and limits.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::Listener;
pub use builder::ListenerBuilder;
pub use event::{EventHandler, ListenerEvent};
pub use options::{
    DEFAULT_BACKLOG, DEFAULT_BUFFER_SIZE, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_SEND_POOL_SIZE, DEFAULT_SWEEP_INTERVAL, ListenerOptions,
};
