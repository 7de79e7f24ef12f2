//! Listener events delivered to the application.

// ============================================================================
// Imports
// ============================================================================

use crate::error::Result;
use crate::protocol::{CloseReason, DataMessage};
use crate::transport::Connection;

// ============================================================================
// Types
// ============================================================================

/// Event handler callback type.
///
/// Called on the connection's receive task, in wire order per connection.
/// Errors and panics are logged and do not affect the connection.
pub type EventHandler = Box<dyn Fn(ListenerEvent) -> Result<()> + Send + Sync>;

// ============================================================================
// ListenerEvent
// ============================================================================

/// Something that happened on one of the listener's connections.
#[derive(Debug, Clone)]
pub enum ListenerEvent {
    /// The opening handshake completed.
    Connected(Connection),

    /// A text or binary message arrived.
    DataReceived {
        /// Source connection.
        connection: Connection,
        /// The reassembled message.
        message: DataMessage,
    },

    /// A ping arrived. A pong was already queued if auto-pong is enabled.
    Ping {
        /// Source connection.
        connection: Connection,
        /// The ping frame.
        message: DataMessage,
    },

    /// A pong arrived.
    Pong {
        /// Source connection.
        connection: Connection,
        /// The pong frame.
        message: DataMessage,
    },

    /// A connection that fired `Connected` went away.
    Disconnected {
        /// The closed connection.
        connection: Connection,
        /// Close code and reason, empty for abrupt disconnects.
        reason: CloseReason,
    },
}

impl ListenerEvent {
    /// The connection the event belongs to.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        match self {
            Self::Connected(connection)
            | Self::DataReceived { connection, .. }
            | Self::Ping { connection, .. }
            | Self::Pong { connection, .. }
            | Self::Disconnected { connection, .. } => connection,
        }
    }

    /// Short name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::DataReceived { .. } => "data_received",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Disconnected { .. } => "disconnected",
        }
    }
}
