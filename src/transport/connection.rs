//! Application-facing connection handle.
//!
//! A [`Connection`] is a cheap, cloneable handle shared between the
//! listener registry, the connection's I/O tasks and the application.
//!
//! # Lifecycle
//!
//! ```text
//! Accepted ─► HandshakePending ─► Open ─► Closing ─► Closed
//!                    │                                  ▲
//!                    └──────────── abort ───────────────┘
//! ```
//!
//! Sends are only accepted while `Open`. Each send encodes one frame with the
//! negotiated [`MessageProcessor`] and queues it for the connection's send
//! task, which writes items in enqueue order.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Instant, SystemTime};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::processor::MessageProcessor;
use crate::protocol::{HandshakeData, Opcode, ProtocolVersion, TextEncoding};

// ============================================================================
// Types
// ============================================================================

/// Queue of `(since, id)` entries the sweep walks oldest-first.
pub(crate) type PendingQueue = Arc<Mutex<VecDeque<(Instant, ConnectionId)>>>;

/// Bytes queued for the send task.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// Handshake response or data frame.
    Data(Vec<u8>),
    /// Close frame; the write half shuts down after it.
    Close(Vec<u8>),
}

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Socket accepted, no bytes processed yet.
    Accepted = 0,
    /// Waiting for a complete upgrade request.
    HandshakePending = 1,
    /// Handshake done; data flows both ways.
    Open = 2,
    /// A close frame was sent or received.
    Closing = 3,
    /// Socket released.
    Closed = 4,
}

impl ConnectionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Accepted,
            1 => Self::HandshakePending,
            2 => Self::Open,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Handle to one accepted WebSocket connection.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync`; clones share state. All send operations
/// are non-blocking and only enqueue bytes.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    id: ConnectionId,
    remote_addr: SocketAddr,
    accepted_at: Instant,
    accepted_at_wall: SystemTime,
    encoding: TextEncoding,

    state: AtomicU8,
    handshake: OnceLock<HandshakeData>,
    processor: OnceLock<Arc<dyn MessageProcessor>>,
    close_initiated_at: Mutex<Option<Instant>>,

    outbound: mpsc::UnboundedSender<Outbound>,
    abort: watch::Sender<bool>,
    close_queue: PendingQueue,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("remote_addr", &self.inner.remote_addr)
            .field("state", &self.state())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Constructor
// ============================================================================

impl Connection {
    /// Creates a connection in the `Accepted` state.
    ///
    /// Returns the receiving end of the outbound queue for the send task.
    pub(crate) fn new(
        id: ConnectionId,
        remote_addr: SocketAddr,
        encoding: TextEncoding,
        close_queue: PendingQueue,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (abort, _) = watch::channel(false);

        let connection = Self {
            inner: Arc::new(ConnectionInner {
                id,
                remote_addr,
                accepted_at: Instant::now(),
                accepted_at_wall: SystemTime::now(),
                encoding,
                state: AtomicU8::new(ConnectionState::Accepted as u8),
                handshake: OnceLock::new(),
                processor: OnceLock::new(),
                close_initiated_at: Mutex::new(None),
                outbound,
                abort,
                close_queue,
            }),
        };

        (connection, outbound_rx)
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Unique connection identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Peer address.
    #[inline]
    #[must_use]
    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr
    }

    /// Monotonic accept time.
    #[inline]
    #[must_use]
    pub fn accepted_at(&self) -> Instant {
        self.inner.accepted_at
    }

    /// Wall-clock accept time.
    #[inline]
    #[must_use]
    pub fn connected_at(&self) -> SystemTime {
        self.inner.accepted_at_wall
    }

    /// When this side started the closing handshake, if it did.
    #[must_use]
    pub fn close_initiated_at(&self) -> Option<Instant> {
        *self.inner.close_initiated_at.lock()
    }

    /// The upgrade request, available once the handshake completed.
    #[inline]
    #[must_use]
    pub fn handshake(&self) -> Option<&HandshakeData> {
        self.inner.handshake.get()
    }

    /// Negotiated protocol generation.
    #[inline]
    #[must_use]
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.inner.processor.get().map(|p| p.version())
    }

    /// Text encoding used by [`send_text`](Self::send_text).
    #[inline]
    #[must_use]
    pub fn encoding(&self) -> TextEncoding {
        self.inner.encoding
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Returns `true` while data may be sent.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }
}

// ============================================================================
// Connection - Sending
// ============================================================================

impl Connection {
    /// Sends a text message using the listener's text encoding.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is not open
    pub fn send_text(&self, text: &str) -> Result<()> {
        let payload = self.inner.encoding.encode(text);
        self.send_message(Opcode::Text, &payload)
    }

    /// Sends a binary message.
    ///
    /// Hybi-00 peers receive it as a text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is not open
    /// - [`Error::Protocol`] if the payload cannot be framed
    pub fn send_binary(&self, payload: &[u8]) -> Result<()> {
        self.send_message(Opcode::Binary, payload)
    }

    /// Sends a ping.
    ///
    /// # Errors
    ///
    /// - [`Error::Unsupported`] on Hybi-00 connections
    /// - [`Error::Protocol`] if `payload` exceeds 125 bytes
    pub fn send_ping(&self, payload: &[u8]) -> Result<()> {
        self.send_message(Opcode::Ping, payload)
    }

    /// Sends an unsolicited pong.
    ///
    /// # Errors
    ///
    /// Same as [`send_ping`](Self::send_ping).
    pub fn send_pong(&self, payload: &[u8]) -> Result<()> {
        self.send_message(Opcode::Pong, payload)
    }

    /// Encodes and queues one frame.
    ///
    /// Use [`close`](Self::close) for close frames.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is not open
    /// - any framing error from the negotiated [`MessageProcessor`]
    pub fn send_message(&self, opcode: Opcode, payload: &[u8]) -> Result<()> {
        if opcode == Opcode::Close {
            return Err(Error::protocol("use Connection::close to send close frames"));
        }
        if !self.is_open() {
            return Err(Error::ConnectionClosed);
        }
        let frame = self.processor()?.build_frame(opcode, payload)?;
        trace!(id = %self.inner.id, %opcode, len = payload.len(), "Frame queued");
        self.enqueue(Outbound::Data(frame))
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Starts the closing handshake.
    ///
    /// Sends a close frame carrying `code` and `reason`; the socket is
    /// released once the peer answers or the close timeout expires.
    /// Connections still in the opening handshake are aborted instead.
    /// Calling this more than once has no further effect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCloseCode`] if `code` is not valid for the
    /// negotiated generation.
    pub fn close(&self, code: u16, reason: &str) -> Result<()> {
        if let Some(processor) = self.inner.processor.get()
            && !processor.is_valid_close_code(code)
        {
            return Err(Error::invalid_close_code(code, processor.version()));
        }

        if !self.transition(ConnectionState::Open, ConnectionState::Closing) {
            if matches!(
                self.state(),
                ConnectionState::Accepted | ConnectionState::HandshakePending
            ) {
                self.abort();
            }
            return Ok(());
        }

        let now = Instant::now();
        *self.inner.close_initiated_at.lock() = Some(now);
        self.inner.close_queue.lock().push_back((now, self.inner.id));

        let frame = self.processor()?.build_close_frame(code, reason);
        debug!(id = %self.inner.id, code, reason, "Closing handshake started");

        // The send task may already be gone; the sweep still aborts us.
        let _ = self.enqueue(Outbound::Close(frame));
        Ok(())
    }

    /// Drops the connection immediately without a closing handshake.
    pub fn abort(&self) {
        let previous = self
            .inner
            .state
            .swap(ConnectionState::Closed as u8, Ordering::AcqRel);
        if previous != ConnectionState::Closed as u8 {
            debug!(id = %self.inner.id, "Connection aborted");
        }
        self.inner.abort.send_replace(true);
    }
}

// ============================================================================
// Connection - Crate Internals
// ============================================================================

impl Connection {
    /// Marks the start of handshake processing.
    pub(crate) fn begin_handshake(&self) {
        self.transition(ConnectionState::Accepted, ConnectionState::HandshakePending);
    }

    /// Freezes the handshake and opens the connection.
    ///
    /// Returns `false` if the connection was aborted first; the handshake
    /// then stays unset.
    pub(crate) fn establish(
        &self,
        handshake: HandshakeData,
        processor: Arc<dyn MessageProcessor>,
    ) -> bool {
        let _ = self.inner.processor.set(processor);
        if !self.transition(ConnectionState::HandshakePending, ConnectionState::Open) {
            return false;
        }
        let _ = self.inner.handshake.set(handshake);
        true
    }

    /// Peer sent a close frame. Returns `true` if we must echo it.
    pub(crate) fn accept_close(&self) -> bool {
        self.transition(ConnectionState::Open, ConnectionState::Closing)
    }

    /// Queues raw bytes, bypassing the open check (handshake responses).
    pub(crate) fn enqueue(&self, item: Outbound) -> Result<()> {
        self.inner
            .outbound
            .send(item)
            .map_err(|_| Error::ConnectionClosed)
    }

    pub(crate) fn abort_signal(&self) -> watch::Receiver<bool> {
        self.inner.abort.subscribe()
    }

    pub(crate) fn processor(&self) -> Result<&Arc<dyn MessageProcessor>> {
        self.inner.processor.get().ok_or(Error::ConnectionClosed)
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// ============================================================================
// Tests
// ============================================================================
