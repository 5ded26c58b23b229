//! Resource dispatcher
//!
//! Server side of the workload: one resource per traffic class, each answering
//! every inbound request with a canonical log line and exactly one
//! acknowledgment.

use crate::stats::{DispatchSnapshot, DispatchStats};
use cadence_common::TrafficClass;
use cadence_transport::{InboundRequest, ResourceHandler, SessionTransport};
use std::sync::{Arc, Weak};

/// `Received {N} bytes from {address}.`
///
/// The address is the sender's IP without port.
pub fn summary_line(request: &InboundRequest) -> String {
    format!("Received {} bytes from {}.", request.payload_len, request.sender_address())
}

/// What a handler did with one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub summary: String,
    pub acked: bool,
}

/// Handle one inbound request: log its summary, then acknowledge it
///
/// An acknowledgment failure is logged at error level and reported in the
/// outcome; it never propagates.
pub fn handle(
    transport: &dyn SessionTransport,
    stats: &DispatchStats,
    request: &InboundRequest,
) -> DispatchOutcome {
    let summary = summary_line(request);
    tracing::info!("{}", summary);
    stats.record_request(request.payload_len);

    let acked = match transport.send_ack(&request.context) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(
                "Failed to send acknowledgment to {} for '{}': {}",
                request.context.peer,
                request.path,
                e
            );
            false
        }
    };
    stats.record_ack(acked);
    DispatchOutcome { summary, acked }
}

/// Per-class registration result
#[derive(Debug, Default)]
pub struct RegistrationReport {
    pub registered: Vec<TrafficClass>,
    pub failed: Vec<(TrafficClass, cadence_transport::Error)>,
}

impl RegistrationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Registers and serves the per-class resources
pub struct ResourceDispatcher {
    transport: Arc<dyn SessionTransport>,
    periodic: Arc<DispatchStats>,
    aperiodic: Arc<DispatchStats>,
}

impl ResourceDispatcher {
    pub fn new(transport: Arc<dyn SessionTransport>) -> Self {
        Self {
            transport,
            periodic: Arc::new(DispatchStats::new()),
            aperiodic: Arc::new(DispatchStats::new()),
        }
    }

    fn stats_for(&self, class: TrafficClass) -> &Arc<DispatchStats> {
        match class {
            TrafficClass::Periodic => &self.periodic,
            TrafficClass::Aperiodic => &self.aperiodic,
        }
    }

    /// Build the handler for `class`
    ///
    /// The handler holds the transport weakly: the transport owns its handler
    /// table, so a strong reference would keep it alive forever.
    pub fn handler(&self, class: TrafficClass) -> ResourceHandler {
        let transport: Weak<dyn SessionTransport> = Arc::downgrade(&self.transport);
        let stats = self.stats_for(class).clone();
        Arc::new(move |request: &InboundRequest| match transport.upgrade() {
            Some(transport) => {
                handle(transport.as_ref(), &stats, request);
            }
            None => {
                tracing::warn!("Dropping {} request: transport is shut down", class);
            }
        })
    }

    /// Register the resource for one class
    pub fn register(&self, class: TrafficClass) -> cadence_transport::Result<()> {
        let path = class.path();
        match self.transport.register_resource(path, self.handler(class)) {
            Ok(()) => {
                tracing::info!("Set up resource URI: '{}'.", path);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to set up resource URI '{}': {}", path, e);
                Err(e)
            }
        }
    }

    /// Register every class; a failure leaves the other class serving
    pub fn register_all(&self) -> RegistrationReport {
        let mut report = RegistrationReport::default();
        for class in TrafficClass::ALL {
            match self.register(class) {
                Ok(()) => report.registered.push(class),
                Err(e) => report.failed.push((class, e)),
            }
        }
        report
    }

    pub fn snapshot(&self, class: TrafficClass) -> DispatchSnapshot {
        self.stats_for(class).snapshot(class)
    }

    /// Snapshots for all classes
    pub fn snapshots(&self) -> Vec<DispatchSnapshot> {
        TrafficClass::ALL.into_iter().map(|c| self.snapshot(c)).collect()
    }
}
