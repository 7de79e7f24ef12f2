//! Builder pattern for listener configuration.
//!
//! # Example
//!
//! ```no_run
//! use websocket_engine::{Listener, ListenerEvent, ListenerOptions};
//!
//! # async fn example() -> websocket_engine::Result<()> {
//! let listener = Listener::builder()
//!     .bind("127.0.0.1:8080")
//!     .options(ListenerOptions::new().with_max_connections(256))
//!     .on_event(|event| {
//!         if let ListenerEvent::DataReceived { connection, message } = event {
//!             connection.send_binary(message.payload())?;
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
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;

use crate::error::{Error, Result};

use super::core::Listener;
use super::event::{EventHandler, ListenerEvent};
use super::options::ListenerOptions;

// ============================================================================
// Constants
// ============================================================================

/// Default listen address (localhost, random port).
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:0";

// ============================================================================
// ListenerBuilder
// ============================================================================

/// Builder for configuring a [`Listener`] instance.
///
/// Use [`Listener::builder()`] to create a new builder.
#[derive(Default)]
pub struct ListenerBuilder {
    /// Listen address, `127.0.0.1:0` when unset.
    addr: Option<String>,
    /// Listener options.
    options: ListenerOptions,
    /// Application event handler.
    handler: Option<EventHandler>,
}

impl fmt::Debug for ListenerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerBuilder")
            .field("addr", &self.addr)
            .field("options", &self.options)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

// ============================================================================
// ListenerBuilder Implementation
// ============================================================================

impl ListenerBuilder {
    /// Creates a new builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the listen address.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address, e.g. `"0.0.0.0:8080"` (port 0 picks a free port)
    #[inline]
    #[must_use]
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    /// Replaces the listener options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ListenerOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the event handler.
    ///
    /// The handler runs on the connection's receive task; long work should
    /// be moved to a spawned task.
    #[inline]
    #[must_use]
    pub fn on_event<F>(mut self, handler: F) -> Self
    where
        F: Fn(ListenerEvent) -> Result<()> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Builds the listener with validation.
    ///
    /// The listener does not bind until [`Listener::start`] is called.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the address does not parse
    /// - [`Error::Config`] if the options are invalid
    pub fn build(self) -> Result<Listener> {
        let addr = self.validate_addr()?;
        self.options.validate().map_err(Error::config)?;

        Ok(Listener::new(addr, self.options, self.handler))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ListenerBuilder {
    /// Validates the listen address.
    fn validate_addr(&self) -> Result<SocketAddr> {
        let addr = self.addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        addr.parse().map_err(|_| {
            Error::config(format!(
                "Invalid listen address: {addr}\n\
                 Example: Listener::builder().bind(\"127.0.0.1:8080\")"
            ))
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
