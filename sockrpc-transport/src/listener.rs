//! Passive socket with a background accept loop.

use crate::connection::{Connection, DEFAULT_READ_BUFFER_SIZE};
use crate::error::TransportError;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// A bound TCP listener.
pub struct Listener {
    local_addr: SocketAddr,
    listener: parking_lot::Mutex<Option<TcpListener>>,
    stopped: AtomicBool,
    stop_signal: Notify,
    read_buffer_size: usize,
}

impl Listener {
    /// Binds `0.0.0.0:<port>`.
    pub async fn listen(port: u16) -> Result<Self, TransportError> {
        Self::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await
    }

    /// Binds the given address.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        tracing::debug!("Listening on {}", local_addr);

        Ok(Self {
            local_addr,
            listener: parking_lot::Mutex::new(Some(listener)),
            stopped: AtomicBool::new(false),
            stop_signal: Notify::new(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        })
    }

    /// Sets the read buffer size given to accepted connections.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Address the listener is bound to (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Starts the accept loop on a background task.
    ///
    /// Each accepted socket is wrapped in a [`Connection`] and handed to
    /// `on_accept`, unless the listener has been stopped in the meantime.
    pub fn async_accept<F>(self: &Arc<Self>, on_accept: F) -> Result<JoinHandle<()>, TransportError>
    where
        F: Fn(Arc<Connection>) + Send + Sync + 'static,
    {
        let listener = self
            .listener
            .lock()
            .take()
            .ok_or(TransportError::AcceptLoopTaken)?;
        let this = Arc::clone(self);

        Ok(tokio::spawn(async move {
            while !this.is_stopped() {
                tokio::select! {
                    biased;

                    _ = this.stop_signal.notified() => break,

                    result = listener.accept() => {
                        if this.is_stopped() {
                            break;
                        }
                        match result {
                            Ok((stream, addr)) => match Connection::from_stream(stream) {
                                Ok(conn) => {
                                    tracing::debug!("Accepted {} from {}", conn.id(), addr);
                                    on_accept(Arc::new(conn.with_read_buffer_size(this.read_buffer_size)));
                                }
                                Err(e) => {
                                    tracing::warn!("Failed to set up connection from {}: {}", addr, e);
                                }
                            },
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                            }
                        }
                    }
                }
            }

            drop(listener);
            tracing::debug!("Stopped accepting on {}", this.local_addr);
        }))
    }

    /// Stops accepting. The passive socket is closed once the accept loop
    /// observes the stop. Safe to call more than once.
    pub fn stop_accept(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        // Stores a permit if the accept loop is not currently waiting.
        self.stop_signal.notify_one();
        // Accept loop never started: close the socket here.
        drop(self.listener.lock().take());
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.local_addr)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
