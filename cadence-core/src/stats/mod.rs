//! Per-loop and per-resource counters

use cadence_common::TrafficClass;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters owned by one scheduling loop
///
/// Returned by the loop when it stops; never shared while it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStats {
    pub class: TrafficClass,
    /// Requests accepted by the transport
    pub sent: u64,
    /// Requests the transport refused
    pub send_failures: u64,
    /// Polls that found the session down
    pub idle_polls: u64,
    /// Session attempts started from the idle branch
    pub reconnect_attempts: u64,
    /// Wakeups whose deadline had already passed when the sleep began
    pub late_wakeups: u64,
}

impl LoopStats {
    pub fn new(class: TrafficClass) -> Self {
        Self {
            class,
            sent: 0,
            send_failures: 0,
            idle_polls: 0,
            reconnect_attempts: 0,
            late_wakeups: 0,
        }
    }

    /// Emission attempts, successful or not
    pub fn attempts(&self) -> u64 {
        self.sent + self.send_failures
    }
}

/// Server-side counters for one resource path
///
/// Updated from the transport's dispatch thread, read from anywhere.
#[derive(Debug, Default)]
pub struct DispatchStats {
    handled: AtomicU64,
    bytes_received: AtomicU64,
    acks_sent: AtomicU64,
    ack_failures: AtomicU64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, payload_len: usize) {
        self.handled.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    pub fn record_ack(&self, ok: bool) {
        if ok {
            self.acks_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.ack_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self, class: TrafficClass) -> DispatchSnapshot {
        DispatchSnapshot {
            class,
            handled: self.handled.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            acks_sent: self.acks_sent.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSnapshot {
    pub class: TrafficClass,
    pub handled: u64,
    pub bytes_received: u64,
    pub acks_sent: u64,
    pub ack_failures: u64,
}
