//! Request emitter

use cadence_common::TrafficClass;
use cadence_transport::{Destination, SessionTransport};
use std::sync::Arc;
use std::time::Duration;

/// Triggers one send through the transport and logs the outcome
///
/// The wait that follows the send is passed in by the caller, so it is known
/// before the request leaves and the log line always names the real next gap.
pub struct RequestEmitter {
    transport: Arc<dyn SessionTransport>,
}

impl RequestEmitter {
    pub fn new(transport: Arc<dyn SessionTransport>) -> Self {
        Self { transport }
    }

    /// Send one request of `class` to `dest`
    ///
    /// A failure is logged at warn level and returned; the caller does not
    /// retry within the same cycle.
    pub fn emit(
        &self,
        class: TrafficClass,
        dest: &Destination,
        next_wait: Duration,
    ) -> cadence_transport::Result<()> {
        match self.transport.send_request(class, dest) {
            Ok(()) => {
                tracing::info!(
                    "Will wait {} ms before sending next {} request.",
                    next_wait.as_millis(),
                    class
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to send {} request to {}: {}", class, dest, e);
                Err(e)
            }
        }
    }
}
