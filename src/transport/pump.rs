//! Per-connection I/O tasks.
//!
//! Every accepted socket gets two tasks:
//!
//! - **receive**: owns the [`ConnectionToken`], feeds bytes to the handshake
//!   processor until the upgrade completes and to the message processor
//!   afterwards, and dispatches [`ListenerEvent`]s.
//! - **send**: drains the connection's outbound queue in order, leasing a
//!   pooled send buffer per item.
//!
//! When the receive task finishes it releases the socket, unregisters the
//! connection and fires `Disconnected` for connections that fired
//! `Connected`.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::processor::{
    ConnectionToken, FrameSettings, HandshakeOutcome, HandshakeProcessor, message_processor,
};
use crate::protocol::{CloseReason, DataMessage, Opcode, close_code};
use crate::server::{EventHandler, ListenerEvent};

use super::connection::{Connection, Outbound};
use super::pool::{BufferPool, PooledBuffer};

// ============================================================================
// Types
// ============================================================================

/// Connections by id.
pub(crate) type Registry = RwLock<FxHashMap<ConnectionId, Connection>>;

/// How the receive loop ended.
struct Disconnect {
    reason: CloseReason,
    /// A close frame may still be in the send queue.
    graceful: bool,
}

impl Disconnect {
    fn abrupt() -> Self {
        Self {
            reason: CloseReason::default(),
            graceful: false,
        }
    }

    fn graceful(reason: CloseReason) -> Self {
        Self {
            reason,
            graceful: true,
        }
    }
}

// ============================================================================
// PumpContext
// ============================================================================

/// Listener-wide state shared by all connection tasks.
pub(crate) struct PumpContext {
    pub(crate) handshake: Box<dyn HandshakeProcessor>,
    pub(crate) frames: FrameSettings,
    pub(crate) auto_pong: bool,
    pub(crate) close_timeout: Duration,
    pub(crate) send_pool: BufferPool,
    pub(crate) registry: Registry,
    pub(crate) handler: Option<EventHandler>,
}

impl PumpContext {
    /// Invokes the application handler, containing errors and panics.
    pub(crate) fn dispatch(&self, event: ListenerEvent) {
        let Some(handler) = &self.handler else {
            return;
        };
        let kind = event.kind();
        let id = event.connection().id();

        match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(%id, event = kind, error = %e, "Event handler failed"),
            Err(_) => warn!(%id, event = kind, "Event handler panicked"),
        }
    }
}

// ============================================================================
// Connection Task
// ============================================================================

/// Drives one connection from accept to release.
pub(crate) async fn run_connection(
    context: Arc<PumpContext>,
    stream: TcpStream,
    connection: Connection,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    mut buffer: PooledBuffer,
) {
    let id = connection.id();
    let (reader, writer) = stream.into_split();

    let send_task = tokio::spawn(send_loop(
        writer,
        outbound,
        context.send_pool.clone(),
        connection.abort_signal(),
    ));

    let disconnect = receive_loop(&context, reader, &connection, &mut buffer).await;
    drop(buffer);

    if disconnect.graceful
        && timeout(context.close_timeout, send_task).await.is_err()
    {
        debug!(%id, "Send queue not drained before close timeout");
    }
    connection.abort();

    context.registry.write().remove(&id);

    if connection.handshake().is_some() {
        debug!(%id, code = ?disconnect.reason.code, "Connection closed");
        context.dispatch(ListenerEvent::Disconnected {
            connection,
            reason: disconnect.reason,
        });
    } else {
        debug!(%id, "Connection dropped before handshake");
    }
}

// ============================================================================
// Receive Loop
// ============================================================================

async fn receive_loop(
    context: &PumpContext,
    mut reader: OwnedReadHalf,
    connection: &Connection,
    buffer: &mut [u8],
) -> Disconnect {
    let id = connection.id();
    let mut token = ConnectionToken::new();
    let mut abort = connection.abort_signal();
    connection.begin_handshake();

    loop {
        let read = tokio::select! {
            read = reader.read(buffer) => read,
            _ = abort.wait_for(|aborted| *aborted) => {
                trace!(%id, "Receive loop aborted");
                return Disconnect::abrupt();
            }
        };

        let n = match read {
            Ok(0) => {
                debug!(%id, "Peer closed the socket");
                return Disconnect::abrupt();
            }
            Ok(n) => n,
            Err(e) => {
                debug!(%id, error = %socket_error("read", &e), "Receive loop ending");
                return Disconnect::abrupt();
            }
        };

        let bytes = &buffer[..n];
        let step = if token.is_handshaked() {
            handle_frames(context, connection, &mut token, bytes)
        } else {
            handle_handshake(context, connection, &mut token, bytes)
        };

        if let ControlFlow::Break(disconnect) = step {
            return disconnect;
        }
    }
}

fn handle_handshake(
    context: &PumpContext,
    connection: &Connection,
    token: &mut ConnectionToken,
    bytes: &[u8],
) -> ControlFlow<Disconnect> {
    match context.handshake.receive(token, bytes) {
        HandshakeOutcome::Wait => ControlFlow::Continue(()),
        HandshakeOutcome::Close(e) => {
            warn!(id = %connection.id(), addr = %connection.remote_addr(), error = %e, "Handshake rejected");
            ControlFlow::Break(Disconnect::abrupt())
        }
        HandshakeOutcome::Success {
            version,
            response,
            trailing,
        } => {
            if connection.enqueue(Outbound::Data(response)).is_err() {
                return ControlFlow::Break(Disconnect::abrupt());
            }
            if !connection.establish(
                token.handshake().clone(),
                message_processor(version, context.frames),
            ) {
                debug!(id = %connection.id(), "Connection aborted during handshake");
                return ControlFlow::Break(Disconnect::abrupt());
            }
            debug!(
                id = %connection.id(),
                %version,
                path = %token.handshake().path,
                "Connection open"
            );
            context.dispatch(ListenerEvent::Connected(connection.clone()));

            if trailing.is_empty() {
                ControlFlow::Continue(())
            } else {
                handle_frames(context, connection, token, &trailing)
            }
        }
    }
}

fn handle_frames(
    context: &PumpContext,
    connection: &Connection,
    token: &mut ConnectionToken,
    bytes: &[u8],
) -> ControlFlow<Disconnect> {
    let id = connection.id();
    let Ok(processor) = connection.processor().cloned() else {
        return ControlFlow::Break(Disconnect::abrupt());
    };

    let outcome = match processor.try_read_message(token, bytes) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(%id, error = %e, "Protocol violation");
            let code = e.close_code().unwrap_or(close_code::PROTOCOL_ERROR);
            let reason = CloseReason::new(code, e.to_string());
            if let Err(close_err) = connection.close(code, &reason.reason) {
                debug!(%id, error = %close_err, "Close frame not sent");
            }
            return ControlFlow::Break(Disconnect::graceful(reason));
        }
    };

    for message in outcome.messages {
        match message.opcode() {
            Opcode::Close => return ControlFlow::Break(handle_close(connection, &message)),
            Opcode::Ping => {
                if context.auto_pong
                    && let Err(e) = connection.send_pong(message.payload())
                {
                    debug!(%id, error = %e, "Automatic pong not sent");
                }
                context.dispatch(ListenerEvent::Ping {
                    connection: connection.clone(),
                    message,
                });
            }
            Opcode::Pong => context.dispatch(ListenerEvent::Pong {
                connection: connection.clone(),
                message,
            }),
            Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                context.dispatch(ListenerEvent::DataReceived {
                    connection: connection.clone(),
                    message,
                });
            }
        }
    }

    ControlFlow::Continue(())
}

/// Peer close: echo it unless we started the closing handshake.
fn handle_close(connection: &Connection, message: &DataMessage) -> Disconnect {
    let reason = message.close_reason();

    if connection.accept_close() {
        debug!(id = %connection.id(), code = ?reason.code, "Peer started closing handshake");
        if let Ok(processor) = connection.processor() {
            let frame = match reason.code {
                Some(code) => processor.build_close_frame(code, ""),
                None => processor.build_frame(Opcode::Close, &[]).unwrap_or_default(),
            };
            let _ = connection.enqueue(Outbound::Close(frame));
        }
    } else {
        debug!(id = %connection.id(), "Closing handshake completed");
    }

    Disconnect::graceful(reason)
}

// ============================================================================
// Send Loop
// ============================================================================

async fn send_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    pool: BufferPool,
    mut abort: watch::Receiver<bool>,
) {
    loop {
        let item = tokio::select! {
            item = outbound.recv() => item,
            _ = abort.wait_for(|aborted| *aborted) => break,
        };
        let Some(item) = item else {
            break;
        };
        let (bytes, last) = match item {
            Outbound::Data(bytes) => (bytes, false),
            Outbound::Close(bytes) => (bytes, true),
        };

        let mut lease = tokio::select! {
            lease = pool.acquire() => match lease {
                Ok(lease) => lease,
                Err(e) => {
                    warn!(error = %e, "Send buffer unavailable");
                    break;
                }
            },
            _ = abort.wait_for(|aborted| *aborted) => break,
        };

        if let Err(e) = write_chunked(&mut writer, &bytes, &mut lease).await {
            debug!(error = %e, "Send loop ending");
            break;
        }
        drop(lease);
        trace!(len = bytes.len(), "Item sent");

        if last {
            break;
        }
    }

    let _ = writer.shutdown().await;
}

/// Writes `bytes` through `buffer` in buffer-sized chunks.
async fn write_chunked(writer: &mut OwnedWriteHalf, bytes: &[u8], buffer: &mut [u8]) -> Result<()> {
    let size = buffer.len().max(1);
    for chunk in bytes.chunks(size) {
        let staged = &mut buffer[..chunk.len()];
        staged.copy_from_slice(chunk);
        writer
            .write_all(staged)
            .await
            .map_err(|e| socket_error("write", &e))?;
    }
    Ok(())
}

/// Wraps a socket failure as a connection error.
fn socket_error(operation: &str, error: &io::Error) -> Error {
    Error::connection(format!("socket {operation} failed: {error}"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;

    use parking_lot::Mutex;

    use crate::processor::{HandshakeSettings, handshake_processor};
    use crate::protocol::TextEncoding;
    use crate::transport::ConnectionState;
    use crate::transport::connection::PendingQueue;

    const UPGRADE: &[u8] = b"GET /chat HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";

    fn context(events: Arc<Mutex<Vec<&'static str>>>) -> PumpContext {
        PumpContext {
            handshake: handshake_processor(HandshakeSettings::default()),
            frames: FrameSettings::default(),
            auto_pong: true,
            close_timeout: Duration::from_secs(1),
            send_pool: BufferPool::new(1, 64),
            registry: RwLock::new(FxHashMap::default()),
            handler: Some(Box::new(move |event| {
                events.lock().push(event.kind());
                Ok(())
            })),
        }
    }

    fn connection() -> (Connection, mpsc::UnboundedReceiver<Outbound>) {
        let addr: SocketAddr = "127.0.0.1:9000".parse().expect("addr");
        Connection::new(
            ConnectionId::next(),
            addr,
            TextEncoding::Utf8,
            PendingQueue::default(),
        )
    }

    #[test]
    fn test_handshake_success_dispatches_connected() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let context = context(Arc::clone(&events));
        let (connection, mut outbound) = connection();
        let mut token = ConnectionToken::new();
        connection.begin_handshake();

        let flow = handle_handshake(&context, &connection, &mut token, UPGRADE);

        assert!(matches!(flow, ControlFlow::Continue(())));
        assert_eq!(connection.state(), ConnectionState::Open);
        assert!(connection.handshake().is_some());
        assert_eq!(*events.lock(), vec!["connected"]);
        assert!(matches!(outbound.try_recv(), Ok(Outbound::Data(_))));
    }

    #[test]
    fn test_aborted_handshake_skips_connected() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let context = context(Arc::clone(&events));
        let (connection, _outbound) = connection();
        let mut token = ConnectionToken::new();
        connection.begin_handshake();
        connection.abort();

        let flow = handle_handshake(&context, &connection, &mut token, UPGRADE);

        assert!(matches!(flow, ControlFlow::Break(_)));
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert!(connection.handshake().is_none());
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_socket_error_is_connection_error() {
        let io_error = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let error = socket_error("write", &io_error);
        assert!(error.is_connection_error());
        assert!(matches!(error, Error::Connection { .. }));
        assert!(error.to_string().contains("socket write failed: pipe closed"));
    }
}
