//! Connection guard
//!
//! Gatekeeper between a scheduling loop and the transport's session state.
//! The state is polled fresh on every call; nothing is cached across loop
//! iterations.

use cadence_transport::{Destination, SessionTransport};
use std::sync::Arc;
use std::time::Duration;

/// Decides whether a loop may send, and what to do while it may not
pub struct ConnectionGuard {
    transport: Arc<dyn SessionTransport>,
    idle_backoff: Duration,
    reconnect: bool,
}

impl ConnectionGuard {
    /// # Parameters
    /// - `transport`: shared session transport
    /// - `idle_backoff`: sleep between polls while the session is down
    /// - `reconnect`: whether idle polls start a session attempt
    pub fn new(
        transport: Arc<dyn SessionTransport>,
        idle_backoff: Duration,
        reconnect: bool,
    ) -> Self {
        Self { transport, idle_backoff, reconnect }
    }

    /// One synchronous query to the transport
    pub fn is_ready(&self) -> bool {
        self.transport.is_session_established()
    }

    pub fn idle_backoff(&self) -> Duration {
        self.idle_backoff
    }

    /// Ask the transport to start a session attempt, if this guard reconnects
    ///
    /// Failures are logged and otherwise ignored; the next poll decides.
    ///
    /// # Returns
    /// `true` if an attempt was made
    pub fn try_reconnect(&self, dest: &Destination) -> bool {
        if !self.reconnect {
            return false;
        }
        if let Err(e) = self.transport.connect(dest) {
            tracing::warn!("Failed to start a session with {}: {}", dest, e);
        }
        true
    }
}
