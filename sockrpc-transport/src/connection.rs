//! A single TCP connection with its receive buffer and read loop.

use crate::error::TransportError;
use sockrpc_protocol::ReceiveBuffer;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};

/// Default size of the scratch buffer used for each socket read (32 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 32 * 1024;

/// Grace period before a delayed close takes effect.
pub const CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(2);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Why a read loop ended.
#[derive(Debug)]
pub enum DisconnectReason {
    /// The peer closed its side (zero-byte read).
    PeerClosed,
    /// The socket read failed.
    ReadError(std::io::Error),
    /// [`Connection::close`] was called locally.
    LocalClose,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::PeerClosed => write!(f, "closed by peer"),
            DisconnectReason::ReadError(e) => write!(f, "read error: {}", e),
            DisconnectReason::LocalClose => write!(f, "closed locally"),
        }
    }
}

/// An established bidirectional byte stream.
///
/// The receive buffer belongs to the read loop and is handed to the
/// `on_data` callback; sends go straight to the socket with no framing.
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    reader: parking_lot::Mutex<Option<OwnedReadHalf>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    connected: AtomicBool,
    closed: watch::Sender<bool>,
    read_buffer_size: usize,
}

impl Connection {
    /// Wraps an already established stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self, TransportError> {
        let peer_addr = stream.peer_addr()?;
        stream.set_nodelay(true).ok();
        let (read_half, write_half) = stream.into_split();
        let (closed, _) = watch::channel(false);

        Ok(Self {
            id: ConnectionId::next(),
            peer_addr,
            reader: parking_lot::Mutex::new(Some(read_half)),
            writer: Mutex::new(Some(write_half)),
            connected: AtomicBool::new(true),
            closed,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        })
    }

    /// Opens an outbound connection to `address:port`.
    pub async fn connect(address: &str, port: u16) -> Result<Self, TransportError> {
        tracing::debug!("Connecting to {}:{}...", address, port);
        let stream = TcpStream::connect((address, port))
            .await
            .map_err(|source| TransportError::Connect {
                addr: format!("{}:{}", address, port),
                source,
            })?;
        Self::from_stream(stream)
    }

    /// Opens an outbound connection, failing after `timeout`.
    pub async fn connect_addr(addr: SocketAddr, timeout: Duration) -> Result<Self, TransportError> {
        tracing::debug!("Connecting to {}...", addr);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout(addr.to_string()))?
            .map_err(|source| TransportError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        Self::from_stream(stream)
    }

    /// Sets the size of the per-read scratch buffer.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Closes the connection. The read loop observes the close and exits
    /// through its disconnect path. Calling it again is a no-op.
    pub fn close(&self) {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        self.closed.send_replace(true);

        drop(self.release_writer());

        if was_connected {
            tracing::debug!("[{}] Closed connection to {}", self.id, self.peer_addr);
        }
    }

    /// Closes the connection after [`CLOSE_GRACE_PERIOD`] without blocking
    /// the caller.
    pub fn delayed_close(self: &Arc<Self>) {
        let conn = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(CLOSE_GRACE_PERIOD).await;
            conn.close();
        });
    }

    /// Resolves once the connection has been closed, locally or by the peer.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Writes raw bytes to the socket.
    ///
    /// A write that is still blocked when the connection closes is
    /// abandoned with [`TransportError::NotConnected`].
    pub async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let result = tokio::select! {
            biased;

            _ = self.closed() => Err(TransportError::NotConnected),

            result = self.write_all(data) => result,
        };

        if !self.is_connected() {
            self.release_writer();
        }
        result
    }

    async fn write_all(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;
        writer.write_all(data).await?;
        Ok(())
    }

    /// Drops the write half unless a send currently holds it.
    fn release_writer(&self) -> Option<OwnedWriteHalf> {
        self.writer.try_lock().ok().and_then(|mut writer| writer.take())
    }

    /// Reads from the socket until it closes.
    ///
    /// Every successful read is appended to the receive buffer and
    /// `on_data` is invoked with it. On EOF, read error or local close the
    /// connection is marked disconnected and `on_disconnect` runs exactly
    /// once. Can only be run once per connection.
    pub async fn run_read_loop<D, F>(
        &self,
        mut on_data: D,
        on_disconnect: F,
    ) -> Result<DisconnectReason, TransportError>
    where
        D: FnMut(&mut ReceiveBuffer),
        F: FnOnce(),
    {
        let mut reader = self
            .reader
            .lock()
            .take()
            .ok_or(TransportError::ReadLoopTaken)?;
        let mut closed = self.closed.subscribe();
        let mut buffer = ReceiveBuffer::with_capacity(self.read_buffer_size);
        let mut scratch = vec![0u8; self.read_buffer_size];

        let reason = loop {
            if *closed.borrow_and_update() {
                break DisconnectReason::LocalClose;
            }

            tokio::select! {
                biased;

                changed = closed.changed() => {
                    if changed.is_err() {
                        break DisconnectReason::LocalClose;
                    }
                }

                result = reader.read(&mut scratch) => {
                    match result {
                        Ok(0) => break DisconnectReason::PeerClosed,
                        Ok(n) => {
                            tracing::trace!("[{}] Received {} bytes", self.id, n);
                            buffer.write(&scratch[..n]);
                            on_data(&mut buffer);
                        }
                        Err(e) => break DisconnectReason::ReadError(e),
                    }
                }
            }
        };

        self.connected.store(false, Ordering::SeqCst);
        self.closed.send_replace(true);
        drop(reader);
        // A send blocked on a full socket still holds the writer; it gives
        // the half up itself once it sees the close.
        if let Some(mut writer) = self.release_writer() {
            let _ = writer.shutdown().await;
        }

        tracing::debug!("[{}] Read loop ended: {}", self.id, reason);
        on_disconnect();
        Ok(reason)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("connected", &self.is_connected())
            .field("read_buffer_size", &self.read_buffer_size)
            .finish()
    }
}
