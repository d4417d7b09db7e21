//! Session management.

use crate::error::ServerError;
use bytes::Bytes;
use sockrpc_protocol::{Call, Encoder};
use sockrpc_transport::{Connection, ConnectionId, TransportError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

/// Default number of frames a session may queue for its writer.
pub const DEFAULT_OUTBOUND_QUEUE_SIZE: usize = 1024;

/// Server-side state of one live connection.
///
/// Outgoing frames are queued to the connection's writer task, so
/// [`Session::send`] never blocks the handler. The queue is bounded: a peer
/// that stops reading until the queue fills up is disconnected.
pub struct Session {
    /// Unique session ID.
    id: Uuid,
    conn: Arc<Connection>,
    outbound: mpsc::Sender<Bytes>,
    call_count: AtomicU64,
    created_at: Instant,
}

impl Session {
    /// Creates a session for `conn` and returns the receiving end of its
    /// outbound queue.
    pub fn new(conn: Arc<Connection>) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        Self::with_queue_size(conn, DEFAULT_OUTBOUND_QUEUE_SIZE)
    }

    /// Like [`new`](Self::new) with an outbound queue holding at most
    /// `queue_size` frames.
    pub fn with_queue_size(
        conn: Arc<Connection>,
        queue_size: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (outbound, rx) = mpsc::channel(queue_size.max(1));
        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            conn,
            outbound,
            call_count: AtomicU64::new(0),
            created_at: Instant::now(),
        });
        (session, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.conn.id()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.conn.peer_addr()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Sends a plain message frame to the peer.
    pub fn send(&self, message: impl Into<Bytes>) -> Result<(), ServerError> {
        self.enqueue(Encoder::encode_message(message).freeze())
    }

    /// Answers `call`. Tagged calls get a reply carrying the same tag,
    /// untagged calls a plain message.
    pub fn reply(&self, call: &Call, body: impl Into<Bytes>) -> Result<(), ServerError> {
        self.enqueue(Encoder::encode_reply(call.tag, body).freeze())
    }

    fn enqueue(&self, frame: Bytes) -> Result<(), ServerError> {
        if !self.conn.is_connected() {
            return Err(TransportError::NotConnected.into());
        }
        match self.outbound.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    "[{}] Outbound queue full, closing connection",
                    self.conn.peer_addr()
                );
                self.conn.close();
                Err(ServerError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(TransportError::NotConnected.into()),
        }
    }

    /// Closes the underlying connection. Frames still queued are dropped.
    pub fn close(&self) {
        self.conn.close();
    }

    /// Closes the underlying connection after the transport's grace period,
    /// giving queued frames time to reach the peer.
    pub fn delayed_close(&self) {
        self.conn.delayed_close();
    }

    /// Records a dispatched call.
    pub fn record_call(&self) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of calls dispatched on this session.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Returns the session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("connection", &self.conn.id())
            .field("remote_addr", &self.conn.peer_addr())
            .field("call_count", &self.call_count())
            .finish()
    }
}

/// Why a session was not admitted to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// The connection limit is reached.
    Full,
    /// The registry is closed because the server is stopping.
    Closed,
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<ConnectionId, Arc<Session>>,
    closed: bool,
}

/// The set of live sessions, keyed by connection.
#[derive(Default)]
pub struct SessionRegistry {
    state: parking_lot::Mutex<RegistryState>,
    emptied: Notify,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session unless the registry is closed or already holds
    /// `limit` sessions.
    pub fn try_insert(&self, session: Arc<Session>, limit: usize) -> Result<(), Rejected> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Rejected::Closed);
        }
        if state.sessions.len() >= limit {
            return Err(Rejected::Full);
        }
        state.sessions.insert(session.connection_id(), session);
        Ok(())
    }

    /// Removes a session, waking [`wait_empty`](Self::wait_empty) callers if
    /// it was the last one.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Session>> {
        let mut state = self.state.lock();
        let removed = state.sessions.remove(&id);
        if removed.is_some() && state.sessions.is_empty() {
            self.emptied.notify_waiters();
        }
        removed
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Session>> {
        self.state.lock().sessions.get(&id).cloned()
    }

    /// Returns the sessions registered right now.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.state.lock().sessions.values().cloned().collect()
    }

    /// Stops admitting sessions and returns the ones still registered.
    pub fn close(&self) -> Vec<Arc<Session>> {
        let mut state = self.state.lock();
        state.closed = true;
        state.sessions.values().cloned().collect()
    }

    /// Admits sessions again after [`close`](Self::close).
    pub fn reopen(&self) {
        self.state.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().sessions.is_empty()
    }

    /// Resolves once no session is registered.
    pub async fn wait_empty(&self) {
        loop {
            let notified = self.emptied.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SessionRegistry")
            .field("sessions", &state.sessions.len())
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sockrpc_protocol::{Decoder, Inbound, ReceiveBuffer};
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    /// Returns a server-side connection and the raw client socket.
    async fn connection_pair() -> (Arc<Connection>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (Arc::new(Connection::from_stream(server).unwrap()), client)
    }

    #[tokio::test]
    async fn test_send_queues_plain_message() {
        let (conn, _client) = connection_pair().await;
        let (session, mut outbound) = Session::new(conn);

        session.send("hello").unwrap();

        let frame = outbound.recv().await.unwrap();
        let mut buffer = ReceiveBuffer::new();
        buffer.write(&frame);
        let frame = Decoder::new().decode_frame(&mut buffer).unwrap().unwrap();
        assert!(frame.is_message());
        assert_eq!(frame.body.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_reply_keeps_tag() {
        let (conn, _client) = connection_pair().await;
        let (session, mut outbound) = Session::new(conn);

        let mut call = Call::new("ping", vec![]);
        call.tag = Some(9);
        session.reply(&call, "pong").unwrap();
        session.reply(&Call::new("ping", vec![]), "pong").unwrap();

        let decoder = Decoder::new();
        let mut buffer = ReceiveBuffer::new();
        buffer.write(&outbound.recv().await.unwrap());
        buffer.write(&outbound.recv().await.unwrap());

        let tagged = decoder.decode_frame(&mut buffer).unwrap().unwrap();
        assert_eq!(
            Inbound::classify(tagged),
            Inbound::Reply {
                id: 9,
                body: Bytes::from_static(b"pong")
            }
        );
        let plain = decoder.decode_frame(&mut buffer).unwrap().unwrap();
        assert!(plain.is_message());
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (conn, mut client) = connection_pair().await;
        let (session, _outbound) = Session::new(conn);

        session.close();
        session.close();
        assert!(!session.is_connected());
        assert!(matches!(
            session.send("late"),
            Err(ServerError::Transport(TransportError::NotConnected))
        ));

        // Peer observes EOF once the writer half is dropped
        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_closes_session() {
        let (conn, mut client) = connection_pair().await;
        let (session, mut outbound) = Session::with_queue_size(conn, 2);

        session.send("one").unwrap();
        session.send("two").unwrap();
        assert!(matches!(session.send("three"), Err(ServerError::QueueFull)));
        assert!(!session.is_connected());
        assert!(matches!(
            session.send("four"),
            Err(ServerError::Transport(TransportError::NotConnected))
        ));

        // Frames queued before the overflow are still there
        assert!(outbound.recv().await.is_some());
        assert!(outbound.recv().await.is_some());

        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_call_count() {
        let (conn, _client) = connection_pair().await;
        let (session, _outbound) = Session::new(conn);
        session.record_call();
        session.record_call();
        assert_eq!(session.call_count(), 2);
    }

    #[tokio::test]
    async fn test_registry_insert_remove() {
        let registry = SessionRegistry::new();
        let (conn, _client) = connection_pair().await;
        let (session, _outbound) = Session::new(conn);
        let id = session.connection_id();

        registry.try_insert(session.clone(), 10).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(id).unwrap().id(), session.id());

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_registry_limit_and_close() {
        let registry = SessionRegistry::new();
        let (a, _ca) = connection_pair().await;
        let (b, _cb) = connection_pair().await;
        let (first, _) = Session::new(a);
        let (second, _) = Session::new(b);

        registry.try_insert(first, 1).unwrap();
        assert_eq!(
            registry.try_insert(second.clone(), 1),
            Err(Rejected::Full)
        );

        let remaining = registry.close();
        assert_eq!(remaining.len(), 1);
        assert!(registry.is_closed());
        assert_eq!(
            registry.try_insert(second.clone(), 10),
            Err(Rejected::Closed)
        );

        registry.reopen();
        registry.try_insert(second, 10).unwrap();
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_wait_empty() {
        let registry = Arc::new(SessionRegistry::new());
        registry.wait_empty().await;

        let (conn, _client) = connection_pair().await;
        let (session, _outbound) = Session::new(conn);
        let id = session.connection_id();
        registry.try_insert(session, 10).unwrap();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait_empty().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        registry.remove(id);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
