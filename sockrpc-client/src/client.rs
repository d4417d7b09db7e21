//! High-level client API.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::pending::{Pending, ReplyReceiver};
use bytes::Bytes;
use sockrpc_protocol::{encode_args, Decoder, Encoder, Inbound, ReceiveBuffer};
use sockrpc_transport::Connection;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// RPC client for a sockrpc server.
///
/// [`call`](Self::call) sends a frame and waits for the matching reply. In
/// the default untagged mode the server answers with plain messages, so
/// calls are serialized and at most one is in flight. With
/// [`ClientConfig::with_tagged_calls`] every call carries a request id and
/// calls may overlap.
pub struct RpcClient {
    config: ClientConfig,
    link: parking_lot::Mutex<Option<Link>>,
    /// Serializes untagged calls.
    call_lock: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
}

/// The current connection and the waiters for replies on it.
#[derive(Clone)]
struct Link {
    conn: Arc<Connection>,
    pending: Arc<Pending>,
}

impl RpcClient {
    /// Creates a new client with the given configuration (not yet connected).
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            link: parking_lot::Mutex::new(None),
            call_lock: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Connects to the server and starts the background read loop.
    ///
    /// `on_disconnect` runs once when the connection ends, whichever side
    /// closed it. A previous connection is closed first.
    pub async fn connect<F>(&self, on_disconnect: F) -> Result<(), ClientError>
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(previous) = self.link.lock().take() {
            previous.conn.close();
            previous.pending.fail_all();
        }

        let conn = Connection::connect_addr(self.config.addr, self.config.connect_timeout)
            .await
            .map_err(|e| {
                tracing::debug!("Connection failed: {}", e);
                ClientError::from(e)
            })?;
        let conn = Arc::new(conn.with_read_buffer_size(self.config.read_buffer_size));
        tracing::debug!("Connected to {} ({})", self.config.addr, conn.id());

        let pending = Arc::new(Pending::new());
        *self.link.lock() = Some(Link {
            conn: conn.clone(),
            pending: pending.clone(),
        });

        let decoder = Decoder::with_max_frame_size(self.config.max_frame_size);
        tokio::spawn(async move {
            let result = conn
                .run_read_loop(
                    |buffer| receive(&conn, &decoder, &pending, buffer),
                    || {
                        pending.fail_all();
                        on_disconnect();
                    },
                )
                .await;

            match result {
                Ok(reason) => tracing::debug!("read_loop: {} {}", conn.id(), reason),
                Err(e) => tracing::warn!("read_loop: {} failed: {}", conn.id(), e),
            }
        });

        Ok(())
    }

    /// Calls `name` with a raw argument body and returns the reply body.
    pub async fn call(&self, name: &str, body: impl Into<Bytes>) -> Result<Bytes, ClientError> {
        let Link { conn, pending } = self.live_link()?;

        if self.config.tagged_calls {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let rx = pending.register(id)?;
            let frame = Encoder::encode_tagged_call(id, name, body);

            tracing::debug!("Sending call #{} {} ({} bytes)", id, name, frame.len());
            if let Err(e) = conn.send(&frame).await {
                pending.cancel(id);
                return Err(e.into());
            }

            let reply = self.await_reply(rx).await;
            if reply.is_err() {
                pending.cancel(id);
            }
            return reply;
        }

        let _guard = self.call_lock.lock().await;
        let rx = pending.register_untagged()?;
        let frame = Encoder::encode_call(name, body);

        tracing::debug!("Sending call {} ({} bytes)", name, frame.len());
        if let Err(e) = conn.send(&frame).await {
            pending.cancel_untagged();
            return Err(e.into());
        }

        let reply = self.await_reply(rx).await;
        if reply.is_err() {
            pending.cancel_untagged();
        }
        reply
    }

    /// Calls `name` with a list of arguments. Arguments containing commas
    /// or quotes are quoted.
    pub async fn call_args<S: AsRef<str>>(
        &self,
        name: &str,
        args: &[S],
    ) -> Result<Bytes, ClientError> {
        self.call(name, encode_args(args)).await
    }

    /// Like [`call_args`](Self::call_args), decoding the reply as UTF-8.
    pub async fn call_text<S: AsRef<str>>(
        &self,
        name: &str,
        args: &[S],
    ) -> Result<String, ClientError> {
        let reply = self.call_args(name, args).await?;
        String::from_utf8(reply.to_vec())
            .map_err(|e| ClientError::InvalidReply(format!("reply to {} is not UTF-8: {}", name, e)))
    }

    /// Sends a plain message. No reply is expected.
    pub async fn send(&self, body: impl Into<Bytes>) -> Result<(), ClientError> {
        let link = self.live_link()?;
        link.conn.send(&Encoder::encode_message(body)).await?;
        Ok(())
    }

    /// Closes the connection. Waiting calls fail with
    /// [`ClientError::ConnectionClosed`].
    pub fn close(&self) {
        if let Some(link) = self.link.lock().take() {
            tracing::debug!("Closing connection {}", link.conn.id());
            link.conn.close();
            link.pending.fail_all();
        }
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.link
            .lock()
            .as_ref()
            .map(|link| link.conn.is_connected())
            .unwrap_or(false)
    }

    /// Returns the number of calls waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.link
            .lock()
            .as_ref()
            .map(|link| link.pending.len())
            .unwrap_or(0)
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.config.addr
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn live_link(&self) -> Result<Link, ClientError> {
        match self.link.lock().as_ref() {
            Some(link) if link.conn.is_connected() => Ok(link.clone()),
            _ => Err(ClientError::NotConnected),
        }
    }

    async fn await_reply(&self, rx: ReplyReceiver) -> Result<Bytes, ClientError> {
        match self.config.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, rx)
                .await
                .map_err(|_| {
                    tracing::debug!("Call timed out after {:?}", timeout);
                    ClientError::Timeout
                })?
                .map_err(|_| ClientError::ConnectionClosed),
            None => rx.await.map_err(|_| ClientError::ConnectionClosed),
        }
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.conn.close();
        }
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("addr", &self.config.addr)
            .field("connected", &self.is_connected())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Routes every complete frame in the buffer to its waiter.
fn receive(conn: &Connection, decoder: &Decoder, pending: &Pending, buffer: &mut ReceiveBuffer) {
    loop {
        let frame = match decoder.decode_frame(buffer) {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) if e.is_connection_fatal() => {
                tracing::warn!("read_loop: closing {}: {}", conn.id(), e);
                buffer.clear();
                conn.close();
                break;
            }
            Err(e) => {
                tracing::warn!("read_loop: dropping frame: {}", e);
                continue;
            }
        };

        match Inbound::classify(frame) {
            Inbound::Message(body) => {
                if !pending.complete_untagged(body) {
                    tracing::debug!("read_loop: no waiter for plain message, dropped");
                }
            }
            Inbound::Reply { id, body } => {
                if !pending.complete(id, body) {
                    tracing::debug!("read_loop: no pending call for id={}", id);
                }
            }
            Inbound::Call(frame) => {
                tracing::warn!("read_loop: ignoring call {:?} from server", frame.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sockrpc_protocol::{Call, Frame};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;

    /// Reads one frame from a raw socket.
    async fn read_call(stream: &mut TcpStream, buffer: &mut ReceiveBuffer) -> Option<Frame> {
        let decoder = Decoder::new();
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(frame) = decoder.decode_frame(buffer).unwrap() {
                return Some(frame);
            }
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buffer.write(&chunk[..n]);
        }
    }

    /// Minimal server answering each call with its arguments joined by `+`.
    async fn spawn_peer() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buffer = ReceiveBuffer::new();
                    while let Some(frame) = read_call(&mut stream, &mut buffer).await {
                        let call = Call::from_frame(&frame).unwrap();
                        if call.name == "silent" {
                            continue;
                        }
                        let reply = Encoder::encode_reply(call.tag, call.args.join("+"));
                        if stream.write_all(&reply).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        addr
    }

    fn config(addr: SocketAddr) -> ClientConfig {
        ClientConfig::new(addr).with_request_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_not_connected() {
        let client = RpcClient::new(config("127.0.0.1:1".parse().unwrap()));
        assert!(!client.is_connected());
        assert!(matches!(
            client.call("ping", Bytes::new()).await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            client.send("hello").await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_call_roundtrip() {
        let addr = spawn_peer().await;
        let client = RpcClient::new(config(addr));
        client.connect(|| {}).await.unwrap();
        assert!(client.is_connected());

        let reply = client.call_args("add", &["1", "2,3"]).await.unwrap();
        assert_eq!(reply.as_ref(), b"1+2,3");

        let text = client.call_text("add", &["x"]).await.unwrap();
        assert_eq!(text, "x");
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_tagged_concurrent_calls() {
        let addr = spawn_peer().await;
        let client = Arc::new(RpcClient::new(config(addr).with_tagged_calls(true)));
        client.connect(|| {}).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                let reply = client.call_args("id", &[i.to_string()]).await.unwrap();
                assert_eq!(reply, Bytes::from(i.to_string()));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_call_timeout() {
        let addr = spawn_peer().await;
        let client = RpcClient::new(
            ClientConfig::new(addr).with_request_timeout(Duration::from_millis(50)),
        );
        client.connect(|| {}).await.unwrap();

        assert!(matches!(
            client.call("silent", Bytes::new()).await,
            Err(ClientError::Timeout)
        ));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_fails_waiting_call() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buffer = ReceiveBuffer::new();
            // Read the call, then hang up without answering
            read_call(&mut stream, &mut buffer).await;
        });

        let client = RpcClient::new(ClientConfig::new(addr).without_request_timeout());
        let (tx, rx) = oneshot::channel();
        client
            .connect(move || {
                let _ = tx.send(());
            })
            .await
            .unwrap();

        assert!(matches!(
            client.call("hang", Bytes::new()).await,
            Err(ClientError::ConnectionClosed)
        ));
        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_close() {
        let addr = spawn_peer().await;
        let client = RpcClient::new(config(addr));
        let (tx, rx) = oneshot::channel();
        client
            .connect(move || {
                let _ = tx.send(());
            })
            .await
            .unwrap();

        client.close();
        client.close();
        assert!(!client.is_connected());
        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_keeps_new_connection_usable() {
        let addr = spawn_peer().await;
        let client = RpcClient::new(config(addr));

        for _ in 0..50 {
            client.connect(|| {}).await.unwrap();
            client.connect(|| {}).await.unwrap();
            let reply = client.call_args("id", &["ok"]).await.unwrap();
            assert_eq!(reply.as_ref(), b"ok");
        }
    }

    #[tokio::test]
    async fn test_reconnect_fails_calls_on_old_connection() {
        let addr = spawn_peer().await;
        let client = Arc::new(RpcClient::new(config(addr).without_request_timeout()));
        client.connect(|| {}).await.unwrap();

        let waiting = client.clone();
        let call = tokio::spawn(async move { waiting.call("silent", Bytes::new()).await });
        tokio::time::timeout(Duration::from_secs(5), async {
            while client.pending_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        client.connect(|| {}).await.unwrap();
        assert!(matches!(
            call.await.unwrap(),
            Err(ClientError::ConnectionClosed)
        ));
        assert_eq!(client.pending_count(), 0);
        assert_eq!(client.call_args("id", &["new"]).await.unwrap().as_ref(), b"new");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RpcClient::new(config(addr));
        let err = client.connect(|| {}).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
