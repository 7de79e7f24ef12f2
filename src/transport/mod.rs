//! Socket-level plumbing.
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────────────────┐
//!   TcpStream ───────► │ receive task             │
//!     (read half)      │  ConnectionToken         │──► ListenerEvent
//!                      │  Handshake/Message proc. │
//!                      └────────────┬─────────────┘
//!                                   │ Outbound (responses, pongs, close echo)
//!   Connection::send_* ─────────────┤
//!                                   ▼
//!                      ┌──────────────────────────┐
//!   TcpStream ◄─────── │ send task                │
//!     (write half)     │  pooled send buffer      │
//!                      └──────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Application-facing connection handle |
//! | `pool` | Bounded buffer pool |
//! | `pump` | Receive and send tasks |

// ============================================================================
// Submodules
// ============================================================================

/// Application-facing connection handle.
pub mod connection;

/// Bounded buffer pool.
pub mod pool;

pub(crate) mod pump;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, ConnectionState};
pub use pool::{BufferPool, PooledBuffer};
