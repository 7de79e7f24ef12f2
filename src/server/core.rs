//! Listener: accept loop, registry and timeout sweep.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                    Listener                      │
//! │  accept loop ──► receive pool lease ──► spawn    │
//! │                                                  │
//! │  registry:      ConnectionId → Connection        │
//! │  open queue:    (accepted_at, id) oldest first   │
//! │  close queue:   (close_sent_at, id) oldest first │
//! │                                                  │
//! │  sweep (every sweep_interval) ──► abort expired  │
//! └──────────────────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::processor::handshake_processor;
use crate::transport::connection::PendingQueue;
use crate::transport::pump::{PumpContext, run_connection};
use crate::transport::{BufferPool, Connection, ConnectionState};

use super::builder::ListenerBuilder;
use super::event::EventHandler;
use super::options::ListenerOptions;

// ============================================================================
// Constants
// ============================================================================

/// How often the accept loop checks the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Listener
// ============================================================================

/// WebSocket server for Hybi-00, Hybi-10 and RFC 6455 clients.
///
/// Thread-safe; all methods take `&self`.
///
/// # Example
///
/// ```ignore
/// let listener = Listener::builder().bind("127.0.0.1:0").build()?;
/// let addr = listener.start().await?;
/// println!("Listening on {}", listener.ws_url().unwrap_or_default());
/// ```
pub struct Listener {
    inner: Arc<ListenerInner>,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("addr", &self.inner.addr)
            .field("local_addr", &self.local_addr())
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

struct ListenerInner {
    /// Requested listen address.
    addr: SocketAddr,
    options: ListenerOptions,
    /// Bound address, set by `start`.
    local_addr: OnceLock<SocketAddr>,

    context: Arc<PumpContext>,
    receive_pool: BufferPool,
    open_pending: PendingQueue,
    close_pending: PendingQueue,

    /// Shutdown flag.
    shutdown: AtomicBool,
}

// ============================================================================
// Listener - Constructor
// ============================================================================

impl Listener {
    /// Creates a new listener builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ListenerBuilder {
        ListenerBuilder::new()
    }

    /// Creates an unstarted listener from validated parts.
    pub(crate) fn new(
        addr: SocketAddr,
        options: ListenerOptions,
        handler: Option<EventHandler>,
    ) -> Self {
        let context = Arc::new(PumpContext {
            handshake: handshake_processor(options.handshake_settings()),
            frames: options.frame_settings(),
            auto_pong: options.auto_pong,
            close_timeout: options.close_handshake_timeout,
            send_pool: BufferPool::new(options.send_pool_size, options.buffer_size),
            registry: RwLock::new(FxHashMap::default()),
            handler,
        });

        Self {
            inner: Arc::new(ListenerInner {
                addr,
                receive_pool: BufferPool::new(options.max_connections, options.buffer_size),
                options,
                local_addr: OnceLock::new(),
                context,
                open_pending: PendingQueue::default(),
                close_pending: PendingQueue::default(),
                shutdown: AtomicBool::new(false),
            }),
        }
    }
}

// ============================================================================
// Listener - Lifecycle
// ============================================================================

impl Listener {
    /// Binds the socket and spawns the accept loop and timeout sweep.
    ///
    /// Returns the bound address (useful with port 0).
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the listener was already started or closed
    /// - [`Error::Io`] if binding fails
    pub async fn start(&self) -> Result<SocketAddr> {
        if self.inner.local_addr.get().is_some() || self.inner.shutdown.load(Ordering::SeqCst) {
            return Err(Error::config("Listener already started"));
        }

        let socket = if self.inner.addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(self.inner.addr)?;
        let listener = socket.listen(self.inner.options.backlog)?;
        let local_addr = listener.local_addr()?;

        if self.inner.local_addr.set(local_addr).is_err() {
            return Err(Error::config("Listener already started"));
        }

        tokio::spawn(Arc::clone(&self.inner).accept_loop(listener));
        tokio::spawn(Arc::clone(&self.inner).sweep_loop());

        info!(
            addr = %local_addr,
            protocol = %self.inner.options.protocol,
            min_version = %self.inner.options.min_version,
            "Listener started"
        );

        Ok(local_addr)
    }

    /// Stops accepting and force-closes every connection.
    pub fn close(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        let connections: Vec<_> = {
            let mut registry = self.inner.context.registry.write();
            registry.drain().map(|(_, connection)| connection).collect()
        };
        for connection in &connections {
            connection.abort();
        }

        self.inner.open_pending.lock().clear();
        self.inner.close_pending.lock().clear();

        info!(closed = connections.len(), "Listener closed");
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        // Stops the accept loop and sweep; open connections keep running.
        self.inner.shutdown.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Listener - Queries
// ============================================================================

impl Listener {
    /// Bound address, `None` before [`start`](Self::start).
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr.get().copied()
    }

    /// WebSocket URL of the listener, e.g. `ws://127.0.0.1:8080`.
    #[must_use]
    pub fn ws_url(&self) -> Option<String> {
        self.local_addr()
            .map(|addr| format!("{}://{addr}", self.inner.options.scheme()))
    }

    /// Listener options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ListenerOptions {
        &self.inner.options
    }

    /// Number of registered connections, handshaking ones included.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.context.registry.read().len()
    }

    /// Looks up a connection by id.
    #[must_use]
    pub fn connection(&self, id: ConnectionId) -> Option<Connection> {
        self.inner.context.registry.read().get(&id).cloned()
    }

    /// Snapshot of all registered connections.
    #[must_use]
    pub fn connections(&self) -> Vec<Connection> {
        self.inner.context.registry.read().values().cloned().collect()
    }

    /// Sends `text` to every open connection.
    ///
    /// Returns the number of connections it was queued on.
    pub fn broadcast_text(&self, text: &str) -> usize {
        self.broadcast(|connection| connection.send_text(text))
    }

    /// Sends `payload` to every open connection.
    ///
    /// Returns the number of connections it was queued on.
    pub fn broadcast_binary(&self, payload: &[u8]) -> usize {
        self.broadcast(|connection| connection.send_binary(payload))
    }

    fn broadcast(&self, send: impl Fn(&Connection) -> Result<()>) -> usize {
        self.connections()
            .iter()
            .filter(|connection| connection.is_open())
            .filter(|connection| match send(connection) {
                Ok(()) => true,
                Err(e) => {
                    debug!(id = %connection.id(), error = %e, "Broadcast skipped connection");
                    false
                }
            })
            .count()
    }
}

// ============================================================================
// Listener - Accept Loop
// ============================================================================

impl ListenerInner {
    /// Background task that accepts new connections.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                debug!("Accept loop shutting down");
                break;
            }

            // Accept with timeout to allow checking shutdown flag
            match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
                Ok(Ok((stream, addr))) => self.handle_accept(stream, addr),
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                }
                Err(_) => continue,
            }
        }

        debug!("Accept loop terminated");
    }

    fn handle_accept(&self, stream: TcpStream, addr: SocketAddr) {
        let buffer = match self.receive_pool.try_acquire() {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(%addr, error = %e, "Dropping connection");
                return;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            trace!(%addr, error = %e, "Failed to set TCP_NODELAY");
        }

        let id = ConnectionId::next();
        let (connection, outbound) = Connection::new(
            id,
            addr,
            self.options.encoding,
            Arc::clone(&self.close_pending),
        );

        self.context.registry.write().insert(id, connection.clone());
        self.open_pending
            .lock()
            .push_back((connection.accepted_at(), id));

        debug!(%id, %addr, "Connection accepted");

        tokio::spawn(run_connection(
            Arc::clone(&self.context),
            stream,
            connection,
            outbound,
            buffer,
        ));
    }
}

// ============================================================================
// Listener - Timeout Sweep
// ============================================================================

impl ListenerInner {
    /// Background task that expires stalled handshakes.
    async fn sweep_loop(self: Arc<Self>) {
        let mut ticker = interval(self.options.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            self.sweep(Instant::now());
        }

        debug!("Sweep loop terminated");
    }

    /// Aborts connections whose opening or closing handshake expired.
    fn sweep(&self, now: Instant) {
        let expired_open = self.expire(
            &self.open_pending,
            self.options.open_handshake_timeout,
            now,
            |state| matches!(state, ConnectionState::Accepted | ConnectionState::HandshakePending),
        );
        let expired_close = self.expire(
            &self.close_pending,
            self.options.close_handshake_timeout,
            now,
            |state| state == ConnectionState::Closing,
        );

        for connection in &expired_open {
            let error = Error::handshake_timeout(millis(self.options.open_handshake_timeout));
            warn!(id = %connection.id(), addr = %connection.remote_addr(), %error, "Opening handshake expired");
            connection.abort();
        }
        for connection in &expired_close {
            let error = Error::handshake_timeout(millis(self.options.close_handshake_timeout));
            warn!(id = %connection.id(), %error, "Closing handshake expired");
            connection.abort();
        }
    }

    /// Pops resolved and expired entries from the front of `queue`.
    ///
    /// Stops at the first entry still within `limit`.
    fn expire(
        &self,
        queue: &PendingQueue,
        limit: Duration,
        now: Instant,
        pending: impl Fn(ConnectionState) -> bool,
    ) -> Vec<Connection> {
        let registry = self.context.registry.read();
        let mut queue = queue.lock();
        let mut expired = Vec::new();

        while let Some(&(since, id)) = queue.front() {
            let connection = registry
                .get(&id)
                .filter(|connection| pending(connection.state()));
            let Some(connection) = connection else {
                queue.pop_front();
                continue;
            };
            if now.saturating_duration_since(since) < limit {
                break;
            }
            queue.pop_front();
            expired.push(connection.clone());
        }

        expired
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex as StdMutex;

    use futures_util::{SinkExt, StreamExt};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    use crate::ListenerEvent;
    use crate::protocol::{ProtocolVersion, close_code};

    const UPGRADE: &str = "GET /chat HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";

    /// Records event kinds and echoes data messages back.
    fn echo_listener(options: ListenerOptions) -> (Listener, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = Listener::builder()
            .options(options)
            .on_event(move |event| {
                let _ = tx.send(event.kind().to_string());
                if let ListenerEvent::DataReceived {
                    connection,
                    message,
                } = &event
                {
                    if message.is_text() {
                        connection.send_text(&message.text(connection.encoding()))?;
                    } else {
                        connection.send_binary(message.payload())?;
                    }
                }
                Ok(())
            })
            .build()
            .expect("valid listener");
        (listener, rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time")
            .expect("channel open")
    }

    /// Reads until the response head is complete.
    async fn read_response(stream: &mut TcpStream) -> Vec<u8> {
        let mut response = Vec::new();
        let mut byte = [0u8; 1];
        while !response.ends_with(b"\r\n\r\n") {
            let n = timeout(Duration::from_secs(5), stream.read(&mut byte))
                .await
                .expect("response in time")
                .expect("read");
            assert!(n > 0, "socket closed during handshake");
            response.push(byte[0]);
        }
        response
    }

    async fn read_exact(stream: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        timeout(Duration::from_secs(5), stream.read_exact(&mut bytes))
            .await
            .expect("bytes in time")
            .expect("read");
        bytes
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition reached");
    }

    #[tokio::test]
    async fn test_start_and_close() {
        let listener = Listener::builder().build().expect("valid listener");
        let addr = listener.start().await.expect("start");
        assert!(addr.port() > 0);
        assert_eq!(listener.local_addr(), Some(addr));
        assert_eq!(listener.ws_url(), Some(format!("ws://{addr}")));
        assert!(listener.start().await.is_err());
        listener.close();
    }

    #[tokio::test]
    async fn test_raw_handshake_and_hello() {
        let (listener, mut events) = echo_listener(ListenerOptions::new());
        let addr = listener.start().await.expect("start");

        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream.write_all(UPGRADE.as_bytes()).await.expect("write");

        let response = String::from_utf8(read_response(&mut stream).await).expect("ascii");
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert_eq!(next_event(&mut events).await, "connected");

        let hello = [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58];
        stream.write_all(&hello).await.expect("write frame");
        assert_eq!(next_event(&mut events).await, "data_received");
        assert_eq!(read_exact(&mut stream, 7).await, b"\x81\x05Hello".to_vec());

        let connections = listener.connections();
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].version(), Some(ProtocolVersion::Rfc6455));
        assert_eq!(
            listener.connection(connections[0].id()).map(|c| c.id()),
            Some(connections[0].id())
        );

        listener.close();
    }

    #[tokio::test]
    async fn test_handshake_split_across_writes() {
        let (listener, mut events) = echo_listener(ListenerOptions::new());
        let addr = listener.start().await.expect("start");

        let mut stream = TcpStream::connect(addr).await.expect("connect");
        for chunk in UPGRADE.as_bytes().chunks(5) {
            stream.write_all(chunk).await.expect("write");
            stream.flush().await.expect("flush");
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let response = read_response(&mut stream).await;
        assert!(response.starts_with(b"HTTP/1.1 101"));
        assert_eq!(next_event(&mut events).await, "connected");
        listener.close();
    }

    #[tokio::test]
    async fn test_ping_gets_automatic_pong() {
        let (listener, mut events) = echo_listener(ListenerOptions::new());
        let addr = listener.start().await.expect("start");

        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream.write_all(UPGRADE.as_bytes()).await.expect("write");
        read_response(&mut stream).await;
        assert_eq!(next_event(&mut events).await, "connected");

        stream
            .write_all(&[0x89, 0x82, 0, 0, 0, 0, b'h', b'i'])
            .await
            .expect("ping");
        assert_eq!(next_event(&mut events).await, "ping");
        assert_eq!(read_exact(&mut stream, 4).await, b"\x8A\x02hi".to_vec());

        listener.close();
    }

    #[tokio::test]
    async fn test_malformed_handshake_closes_without_response() {
        let (listener, mut events) = echo_listener(ListenerOptions::new());
        let addr = listener.start().await.expect("start");

        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream
            .write_all(b"GET /chat\r\nHost: x\r\n\r\n")
            .await
            .expect("write");

        let mut buf = [0u8; 64];
        let n = timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("closed in time")
            .unwrap_or(0);
        assert_eq!(n, 0);
        wait_until(|| listener.connection_count() == 0).await;
        assert!(events.try_recv().is_err());
        listener.close();
    }

    #[tokio::test]
    async fn test_reserved_bits_get_protocol_error_close() {
        let (listener, mut events) = echo_listener(ListenerOptions::new());
        let addr = listener.start().await.expect("start");

        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream.write_all(UPGRADE.as_bytes()).await.expect("write");
        read_response(&mut stream).await;
        assert_eq!(next_event(&mut events).await, "connected");

        stream.write_all(&[0xC1, 0x80, 0, 0, 0, 0]).await.expect("write");
        let head = read_exact(&mut stream, 4).await;
        assert_eq!(head[0], 0x88);
        assert_eq!(
            u16::from_be_bytes([head[2], head[3]]),
            close_code::PROTOCOL_ERROR
        );
        assert_eq!(next_event(&mut events).await, "disconnected");
        listener.close();
    }

    #[tokio::test]
    async fn test_peer_close_is_echoed() {
        let reasons = Arc::new(StdMutex::new(Vec::new()));
        let recorded = Arc::clone(&reasons);
        let listener = Listener::builder()
            .on_event(move |event| {
                if let ListenerEvent::Disconnected { reason, .. } = event {
                    recorded.lock().expect("lock").push(reason.code);
                }
                Ok(())
            })
            .build()
            .expect("valid listener");
        let addr = listener.start().await.expect("start");

        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream.write_all(UPGRADE.as_bytes()).await.expect("write");
        read_response(&mut stream).await;

        stream
            .write_all(&[0x88, 0x82, 0, 0, 0, 0, 0x03, 0xE9])
            .await
            .expect("close frame");
        assert_eq!(read_exact(&mut stream, 4).await, vec![0x88, 0x02, 0x03, 0xE9]);

        wait_until(|| !reasons.lock().expect("lock").is_empty()).await;
        assert_eq!(reasons.lock().expect("lock")[0], Some(1001));
        wait_until(|| listener.connection_count() == 0).await;
        listener.close();
    }

    #[tokio::test]
    async fn test_pool_exhaustion_drops_excess_sockets() {
        let (listener, mut events) =
            echo_listener(ListenerOptions::new().with_max_connections(1));
        let addr = listener.start().await.expect("start");

        let mut first = TcpStream::connect(addr).await.expect("connect");
        first.write_all(UPGRADE.as_bytes()).await.expect("write");
        read_response(&mut first).await;
        assert_eq!(next_event(&mut events).await, "connected");

        let mut second = TcpStream::connect(addr).await.expect("connect");
        let _ = second.write_all(UPGRADE.as_bytes()).await;
        let mut buf = [0u8; 16];
        let n = timeout(Duration::from_secs(5), second.read(&mut buf))
            .await
            .expect("dropped in time")
            .unwrap_or(0);
        assert_eq!(n, 0);
        assert_eq!(listener.connection_count(), 1);

        // The accept loop keeps running once the pool has room again.
        drop(first);
        assert_eq!(next_event(&mut events).await, "disconnected");
        let mut third = TcpStream::connect(addr).await.expect("connect");
        third.write_all(UPGRADE.as_bytes()).await.expect("write");
        assert!(read_response(&mut third).await.starts_with(b"HTTP/1.1 101"));

        listener.close();
    }

    #[tokio::test]
    async fn test_open_handshake_timeout_sweep() {
        let options = ListenerOptions::new()
            .with_open_handshake_timeout(Duration::from_millis(100))
            .with_sweep_interval(Duration::from_millis(20));
        let (listener, _events) = echo_listener(options);
        let addr = listener.start().await.expect("start");

        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream.write_all(b"GET / HTTP/1.1\r\n").await.expect("partial");

        let mut buf = [0u8; 16];
        let n = timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("swept in time")
            .unwrap_or(0);
        assert_eq!(n, 0);
        wait_until(|| listener.connection_count() == 0).await;
        listener.close();
    }

    #[tokio::test]
    async fn test_close_handshake_timeout_sweep() {
        let options = ListenerOptions::new()
            .with_close_handshake_timeout(Duration::from_millis(100))
            .with_sweep_interval(Duration::from_millis(20));
        let (listener, mut events) = echo_listener(options);
        let addr = listener.start().await.expect("start");

        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream.write_all(UPGRADE.as_bytes()).await.expect("write");
        read_response(&mut stream).await;
        assert_eq!(next_event(&mut events).await, "connected");

        let connection = listener.connections().pop().expect("registered");
        connection.close(close_code::NORMAL, "bye").expect("close");
        assert_eq!(read_exact(&mut stream, 2).await, vec![0x88, 0x05]);

        // Never answer; the sweep releases the connection.
        assert_eq!(next_event(&mut events).await, "disconnected");
        assert_eq!(connection.state(), ConnectionState::Closed);
        listener.close();
    }

    #[tokio::test]
    async fn test_hybi00_client() {
        let (listener, mut events) = echo_listener(ListenerOptions::new());
        let addr = listener.start().await.expect("start");

        let mut stream = TcpStream::connect(addr).await.expect("connect");
        let mut request = b"GET /demo HTTP/1.1\r\nHost: example.com\r\nConnection: Upgrade\r\nSec-WebSocket-Key2: 12998 5 Y3 1  .P00\r\nUpgrade: WebSocket\r\nSec-WebSocket-Key1: 4 @1  46546xW%0l 1 5\r\nOrigin: http://example.com\r\n\r\n".to_vec();
        request.extend_from_slice(b"^n:ds[4U");
        stream.write_all(&request).await.expect("write");

        let response = read_response(&mut stream).await;
        assert!(response.starts_with(b"HTTP/1.1 101 WebSocket Protocol Handshake"));
        assert_eq!(read_exact(&mut stream, 16).await, b"8jKS'y:G*Co,Wxa-".to_vec());
        assert_eq!(next_event(&mut events).await, "connected");

        stream.write_all(b"\x00hi\xFF").await.expect("frame");
        assert_eq!(next_event(&mut events).await, "data_received");
        assert_eq!(read_exact(&mut stream, 4).await, b"\x00hi\xFF".to_vec());
        listener.close();
    }

    #[tokio::test]
    async fn test_tungstenite_client_echo_and_broadcast() {
        let (listener, mut events) = echo_listener(ListenerOptions::new());
        listener.start().await.expect("start");
        let url = format!("{}/echo", listener.ws_url().expect("started"));

        let (mut client, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .expect("client handshake");
        assert_eq!(next_event(&mut events).await, "connected");

        client
            .send(Message::Text("hello engine".into()))
            .await
            .expect("send");
        let reply = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("reply in time")
            .expect("stream open")
            .expect("valid message");
        assert_eq!(reply.into_text().expect("text").as_str(), "hello engine");

        let big = vec![7u8; 70_000];
        client
            .send(Message::Binary(big.clone().into()))
            .await
            .expect("send binary");
        let reply = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("reply in time")
            .expect("stream open")
            .expect("valid message");
        assert_eq!(reply.into_data().as_ref(), big.as_slice());

        assert_eq!(listener.broadcast_text("to all"), 1);
        let reply = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("broadcast in time")
            .expect("stream open")
            .expect("valid message");
        assert_eq!(reply.into_text().expect("text").as_str(), "to all");

        client.close(None).await.expect("close");
        loop {
            if next_event(&mut events).await == "disconnected" {
                break;
            }
        }
        listener.close();
    }

    #[test]
    fn test_debug_shows_address_and_count() {
        let listener = Listener::builder()
            .bind("127.0.0.1:9100")
            .build()
            .expect("valid listener");
        let debug = format!("{listener:?}");
        assert!(debug.starts_with("Listener {"));
        assert!(debug.contains("addr: 127.0.0.1:9100"));
        assert!(debug.contains("local_addr: None"));
        assert!(debug.contains("connections: 0"));
    }

    #[test]
    fn test_sweep_stops_at_first_live_entry() {
        let listener = Listener::builder()
            .options(ListenerOptions::new().with_open_handshake_timeout(Duration::from_secs(5)))
            .build()
            .expect("valid listener");
        let inner = &listener.inner;
        let addr: SocketAddr = "127.0.0.1:1".parse().expect("addr");
        let start = Instant::now();

        let mut ids = Vec::new();
        for offset in [0u64, 1, 10] {
            let (connection, _rx) = Connection::new(
                ConnectionId::next(),
                addr,
                inner.options.encoding,
                Arc::clone(&inner.close_pending),
            );
            let id = connection.id();
            inner.context.registry.write().insert(id, connection);
            inner
                .open_pending
                .lock()
                .push_back((start + Duration::from_secs(offset), id));
            ids.push(id);
        }

        inner.sweep(start + Duration::from_secs(7));

        let aborted: Vec<_> = ids
            .iter()
            .map(|id| inner.context.registry.read()[id].state() == ConnectionState::Closed)
            .collect();
        assert_eq!(aborted, vec![true, true, false]);
        assert_eq!(inner.open_pending.lock().len(), 1);
    }
}
