//! TCP server implementation.

use crate::config::Config;
use crate::error::ServerError;
use crate::handler::EventHandler;
use crate::session::{Rejected, Session, SessionRegistry, DEFAULT_OUTBOUND_QUEUE_SIZE};
use bytes::Bytes;
use sockrpc_protocol::{Call, Decoder, Frame, ProtocolError, ReceiveBuffer, DEFAULT_MAX_FRAME_SIZE};
use sockrpc_transport::{Connection, Listener, DEFAULT_READ_BUFFER_SIZE};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Callback invoked when a connection task panics.
pub type FaultHook = Arc<dyn Fn() + Send + Sync>;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Size of the per-read socket buffer.
    pub read_buffer_size: usize,
    /// Largest frame accepted from a client.
    pub max_frame_size: u64,
    /// Frames queued per session before the peer is disconnected.
    pub outbound_queue_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, sockrpc_protocol::DEFAULT_PORT)),
            max_connections: 1000,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            outbound_queue_size: DEFAULT_OUTBOUND_QUEUE_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Listens on every interface at `port`.
    pub fn with_port(port: u16) -> Self {
        Self::new(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn with_max_frame_size(mut self, size: u64) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_outbound_queue_size(mut self, size: usize) -> Self {
        self.outbound_queue_size = size.max(1);
        self
    }
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            max_connections: config.network.max_connections,
            read_buffer_size: config.network.read_buffer_size,
            max_frame_size: config.limits.max_frame_size,
            outbound_queue_size: config.limits.outbound_queue_size.max(1),
        }
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub calls_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// State shared by the accept loop and every connection task.
struct Dispatcher {
    handler: Arc<dyn EventHandler>,
    registry: Arc<SessionRegistry>,
    stats: Arc<ServerStats>,
    fault_hook: Option<FaultHook>,
    decoder: Decoder,
    max_connections: usize,
    outbound_queue_size: usize,
}

/// RPC server: accepts connections, decodes calls and hands them to a
/// single [`EventHandler`].
pub struct RpcServer {
    config: ServerConfig,
    handler: Arc<dyn EventHandler>,
    registry: Arc<SessionRegistry>,
    stats: Arc<ServerStats>,
    fault_hook: Option<FaultHook>,
    listener: parking_lot::Mutex<Option<Arc<Listener>>>,
    accept_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl RpcServer {
    /// Creates a new server.
    pub fn new(config: ServerConfig, handler: impl EventHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
            registry: Arc::new(SessionRegistry::new()),
            stats: Arc::new(ServerStats::default()),
            fault_hook: None,
            listener: parking_lot::Mutex::new(None),
            accept_task: parking_lot::Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Sets a hook invoked whenever a connection task panics.
    pub fn with_fault_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.fault_hook = Some(Arc::new(hook));
        self
    }

    /// Binds the listener and starts accepting connections.
    ///
    /// Returns the bound address. A bind failure is returned here and the
    /// server stays stopped.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let listener = match Listener::bind(self.config.bind_addr).await {
            Ok(listener) => {
                Arc::new(listener.with_read_buffer_size(self.config.read_buffer_size))
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };
        let local_addr = listener.local_addr();

        self.registry.reopen();
        let dispatcher = Arc::new(Dispatcher {
            handler: self.handler.clone(),
            registry: self.registry.clone(),
            stats: self.stats.clone(),
            fault_hook: self.fault_hook.clone(),
            decoder: Decoder::with_max_frame_size(self.config.max_frame_size),
            max_connections: self.config.max_connections,
            outbound_queue_size: self.config.outbound_queue_size,
        });

        let task = listener.async_accept(move |conn| dispatcher.accept(conn))?;
        *self.listener.lock() = Some(listener);
        *self.accept_task.lock() = Some(task);

        tracing::info!("Server listening on {}", local_addr);
        Ok(local_addr)
    }

    /// Stops the server.
    ///
    /// New connections are refused, every registered connection is closed,
    /// and the call returns once all sessions have been removed and the
    /// listener has stopped.
    pub async fn stop(&self) -> Result<(), ServerError> {
        if !self.is_running() {
            return Err(ServerError::NotRunning);
        }

        let sessions = self.registry.close();
        tracing::info!("Server shutting down ({} sessions)", sessions.len());
        for session in &sessions {
            session.close();
        }
        drop(sessions);

        self.registry.wait_empty().await;

        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener.stop_accept();
        }
        let task = self.accept_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns the bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().as_ref().map(|l| l.local_addr())
    }

    /// Returns the number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Returns the registered sessions.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.registry.snapshot()
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl Dispatcher {
    /// Registers an accepted connection and spawns its tasks.
    fn accept(self: &Arc<Self>, conn: Arc<Connection>) {
        let addr = conn.peer_addr();
        let (session, outbound) = Session::with_queue_size(conn.clone(), self.outbound_queue_size);

        match self.registry.try_insert(session.clone(), self.max_connections) {
            Ok(()) => {}
            Err(Rejected::Full) => {
                tracing::warn!("Connection limit reached, rejecting {}", addr);
                self.stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
                conn.close();
                return;
            }
            Err(Rejected::Closed) => {
                tracing::debug!("Server stopping, rejecting {}", addr);
                conn.close();
                return;
            }
        }

        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
        tracing::info!("Client connected: {} ({})", addr, session.id());

        tokio::spawn(write_loop(conn, outbound));

        let task = tokio::spawn(Arc::clone(self).serve(session.clone()));
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!("[{}] Connection task panicked", addr);
                    this.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                    if let Some(hook) = &this.fault_hook {
                        hook();
                    }
                }
            }
            session.close();
            this.release(&session);
        });
    }

    /// Runs the read loop for one session.
    async fn serve(self: Arc<Self>, session: Arc<Session>) {
        self.handler.on_connect(&session);

        let conn = session.connection().clone();
        let result = conn
            .run_read_loop(
                |buffer| self.dispatch(&session, buffer),
                || self.release(&session),
            )
            .await;

        match result {
            Ok(reason) => tracing::debug!("[{}] Connection ended: {}", session.remote_addr(), reason),
            Err(e) => tracing::warn!("[{}] Read loop failed: {}", session.remote_addr(), e),
        }
    }

    /// Drains every complete frame from the receive buffer.
    fn dispatch(&self, session: &Arc<Session>, buffer: &mut ReceiveBuffer) {
        loop {
            if !session.is_connected() {
                buffer.clear();
                break;
            }
            match self.decoder.decode_frame(buffer) {
                Ok(Some(frame)) => self.dispatch_frame(session, frame),
                Ok(None) => break,
                Err(e) => {
                    self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                    if e.is_connection_fatal() {
                        tracing::warn!("[{}] Closing connection: {}", session.remote_addr(), e);
                        buffer.clear();
                        session.close();
                        break;
                    }
                    tracing::warn!("[{}] Dropping frame: {}", session.remote_addr(), e);
                }
            }
        }
    }

    fn dispatch_frame(&self, session: &Arc<Session>, frame: Frame) {
        match Call::from_frame(&frame) {
            Ok(call) => {
                tracing::debug!(
                    "[{}] Call: {:?} ({} args, tag={:?})",
                    session.remote_addr(),
                    call.name,
                    call.args.len(),
                    call.tag
                );
                session.record_call();
                self.stats.calls_total.fetch_add(1, Ordering::Relaxed);
                self.handler.on_call(session, call);
            }
            Err(e) => self.reject_frame(session, &frame, e),
        }
    }

    fn reject_frame(&self, session: &Session, frame: &Frame, error: ProtocolError) {
        self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            "[{}] Dropping call {:?}: {}",
            session.remote_addr(),
            frame.name,
            error
        );
    }

    /// Removes a session from the registry. Safe to call more than once.
    fn release(&self, session: &Arc<Session>) {
        if self.registry.remove(session.connection_id()).is_some() {
            self.stats.connections_active.fetch_sub(1, Ordering::Relaxed);
            tracing::info!("Client disconnected: {}", session.remote_addr());
            self.handler.on_disconnect(session);
        }
    }
}

/// Writes queued frames to the socket until the session goes away or the
/// connection closes.
async fn write_loop(conn: Arc<Connection>, mut outbound: mpsc::Receiver<Bytes>) {
    loop {
        tokio::select! {
            biased;

            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = conn.send(&frame).await {
                    tracing::debug!("[{}] Write failed: {}", conn.id(), e);
                    break;
                }
            }

            _ = conn.closed() => break,
        }
    }
}
