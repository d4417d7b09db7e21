//! Call handlers.

use crate::session::Session;
use sockrpc_protocol::{encode_args, Call};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Receives every call decoded by the server.
///
/// Runs on the connection's read task: calls from one session are delivered
/// in order, calls from different sessions concurrently.
pub trait EventHandler: Send + Sync + 'static {
    /// Handles one call. Plain messages arrive with an empty name.
    fn on_call(&self, session: &Arc<Session>, call: Call);

    /// A session was registered.
    fn on_connect(&self, _session: &Arc<Session>) {}

    /// A session was removed from the registry.
    fn on_disconnect(&self, _session: &Arc<Session>) {}
}

impl<F> EventHandler for F
where
    F: Fn(&Arc<Session>, Call) + Send + Sync + 'static,
{
    fn on_call(&self, session: &Arc<Session>, call: Call) {
        self(session, call)
    }
}

/// Handler for the methods every sockrpc server answers out of the box.
///
/// | Method  | Reply                                  |
/// |---------|----------------------------------------|
/// | `ping`  | `pong`                                 |
/// | `echo`  | the arguments, re-encoded              |
/// | `time`  | seconds since the Unix epoch           |
/// | `close` | `bye`, then the connection is closed   |
///
/// Anything else is logged and left unanswered.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinHandler;

impl BuiltinHandler {
    pub fn new() -> Self {
        Self
    }

    /// Computes the reply body for `call`, if the method is known.
    pub fn respond(&self, call: &Call) -> Option<String> {
        match call.name.as_str() {
            "ping" => Some("pong".to_string()),
            "echo" => Some(encode_args(&call.args)),
            "time" => {
                let secs = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                Some(secs.to_string())
            }
            "close" => Some("bye".to_string()),
            _ => None,
        }
    }
}

impl EventHandler for BuiltinHandler {
    fn on_call(&self, session: &Arc<Session>, call: Call) {
        if call.is_message() {
            tracing::info!(
                "[{}] Message: {:?}",
                session.remote_addr(),
                call.args.join(",")
            );
            return;
        }

        let Some(body) = self.respond(&call) else {
            tracing::warn!(
                "[{}] Unknown method '{}' ({} args)",
                session.remote_addr(),
                call.name,
                call.args.len()
            );
            return;
        };

        tracing::debug!("[{}] {} -> {}", session.remote_addr(), call.name, body);
        if let Err(e) = session.reply(&call, body) {
            tracing::debug!("[{}] Reply dropped: {}", session.remote_addr(), e);
            return;
        }

        if call.name == "close" {
            session.delayed_close();
        }
    }

    fn on_connect(&self, session: &Arc<Session>) {
        tracing::debug!("[{}] Session {} opened", session.remote_addr(), session.id());
    }

    fn on_disconnect(&self, session: &Arc<Session>) {
        tracing::debug!(
            "[{}] Session {} closed after {} calls",
            session.remote_addr(),
            session.id(),
            session.call_count()
        );
    }
}
