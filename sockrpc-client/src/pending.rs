//! Waiters for outstanding calls.

use crate::error::ClientError;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// Receiving side of a rendezvous slot.
pub type ReplyReceiver = oneshot::Receiver<Bytes>;

#[derive(Default)]
struct PendingState {
    /// Slot for the single in-flight untagged call.
    untagged: Option<oneshot::Sender<Bytes>>,
    /// Slots for tagged calls, keyed by request id.
    tagged: HashMap<u64, oneshot::Sender<Bytes>>,
    closed: bool,
}

/// Rendezvous slots handing replies from the read loop to waiting callers.
///
/// Each connection gets its own set. Dropping a slot's sender wakes its
/// caller with a closed-channel error, which [`Pending::fail_all`] uses on
/// disconnect.
#[derive(Default)]
pub struct Pending {
    state: parking_lot::Mutex<PendingState>,
}

impl Pending {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the untagged slot, replacing an abandoned one.
    pub fn register_untagged(&self) -> Result<ReplyReceiver, ClientError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ClientError::ConnectionClosed);
        }
        let (tx, rx) = oneshot::channel();
        state.untagged = Some(tx);
        Ok(rx)
    }

    /// Opens the slot for request `id`.
    pub fn register(&self, id: u64) -> Result<ReplyReceiver, ClientError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ClientError::ConnectionClosed);
        }
        let (tx, rx) = oneshot::channel();
        state.tagged.insert(id, tx);
        Ok(rx)
    }

    /// Delivers a plain-message reply. Returns `false` when nobody waits.
    pub fn complete_untagged(&self, body: Bytes) -> bool {
        let waiter = self.state.lock().untagged.take();
        match waiter {
            Some(tx) => tx.send(body).is_ok(),
            None => false,
        }
    }

    /// Delivers the reply to request `id`. Returns `false` when nobody waits.
    pub fn complete(&self, id: u64, body: Bytes) -> bool {
        let waiter = self.state.lock().tagged.remove(&id);
        match waiter {
            Some(tx) => tx.send(body).is_ok(),
            None => false,
        }
    }

    pub fn cancel_untagged(&self) {
        self.state.lock().untagged = None;
    }

    pub fn cancel(&self, id: u64) {
        self.state.lock().tagged.remove(&id);
    }

    /// Wakes every waiter with a closed-channel error and refuses new slots.
    pub fn fail_all(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.untagged = None;
        state.tagged.clear();
    }

    /// Returns the number of calls waiting for a reply.
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.tagged.len() + usize::from(state.untagged.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
