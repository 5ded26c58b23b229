//! Per-class control loop

use crate::config::WorkloadConfig;
use crate::connection::ConnectionGuard;
use crate::emitter::RequestEmitter;
use crate::stats::LoopStats;
use crate::threading::Shutdown;
use crate::timing::{duration_ns, Clock};
use crate::workload::ArrivalTimeGenerator;
use crate::Result;
use cadence_common::TrafficClass;
use cadence_transport::{Destination, SessionTransport};
use std::fmt;
use std::sync::Arc;

/// Where the loop is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Session down, backing off
    Idle,
    /// Emitting one request
    Sending,
    /// Sleeping until the next anchored deadline
    Waiting,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Idle => write!(f, "idle"),
            LoopState::Sending => write!(f, "sending"),
            LoopState::Waiting => write!(f, "waiting"),
        }
    }
}

/// Result of one [`SchedulingLoop::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    /// `Sending` if the session was up, `Idle` otherwise
    pub branch: LoopState,
    /// Absolute time the loop slept until
    pub wake_at_ns: u64,
    /// `false` if the sleep was cut short by shutdown
    pub completed: bool,
}

/// One traffic class's control loop
pub struct SchedulingLoop {
    class: TrafficClass,
    dest: Destination,
    guard: ConnectionGuard,
    emitter: RequestEmitter,
    arrivals: ArrivalTimeGenerator,
    clock: Arc<dyn Clock>,
    /// Previous scheduled deadline; `None` at start and after an idle poll
    anchor_ns: Option<u64>,
    state: LoopState,
    stats: LoopStats,
}

impl SchedulingLoop {
    pub fn new(
        class: TrafficClass,
        dest: Destination,
        guard: ConnectionGuard,
        emitter: RequestEmitter,
        arrivals: ArrivalTimeGenerator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            class,
            dest,
            guard,
            emitter,
            arrivals,
            clock,
            anchor_ns: None,
            state: LoopState::Idle,
            stats: LoopStats::new(class),
        }
    }

    /// Wire a loop for `class` from the workload section of a profile
    pub fn from_config(
        class: TrafficClass,
        dest: Destination,
        transport: Arc<dyn SessionTransport>,
        clock: Arc<dyn Clock>,
        config: &WorkloadConfig,
        master_seed: Option<u64>,
    ) -> Result<Self> {
        let arrivals = ArrivalTimeGenerator::from_config(config, master_seed)?;
        let guard =
            ConnectionGuard::new(transport.clone(), config.idle_backoff, config.reconnects(class));
        let emitter = RequestEmitter::new(transport);
        Ok(Self::new(class, dest, guard, emitter, arrivals, clock))
    }

    pub fn class(&self) -> TrafficClass {
        self.class
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// One iteration of the state machine, including its sleep
    pub fn step(&mut self, shutdown: &Shutdown) -> StepOutcome {
        if self.guard.is_ready() {
            self.state = LoopState::Sending;
            let anchor = match self.anchor_ns {
                Some(deadline) => deadline,
                None => self.clock.now_ns(),
            };
            // Drawn before the send so the log names the gap actually used
            let wait = self.arrivals.next(self.class);
            match self.emitter.emit(self.class, &self.dest, wait) {
                Ok(()) => self.stats.sent += 1,
                Err(_) => self.stats.send_failures += 1,
            }

            let deadline = anchor.saturating_add(duration_ns(wait));
            self.anchor_ns = Some(deadline);
            self.state = LoopState::Waiting;
            if deadline <= self.clock.now_ns() {
                self.stats.late_wakeups += 1;
            }
            let completed = self.clock.sleep_until(deadline, shutdown);
            StepOutcome { branch: LoopState::Sending, wake_at_ns: deadline, completed }
        } else {
            self.state = LoopState::Idle;
            self.anchor_ns = None;
            self.stats.idle_polls += 1;
            if self.guard.try_reconnect(&self.dest) {
                self.stats.reconnect_attempts += 1;
            }
            tracing::debug!(
                "{} loop idle, retrying in {} ms",
                self.class,
                self.guard.idle_backoff().as_millis()
            );
            let backoff_ns = duration_ns(self.guard.idle_backoff());
            let wake_at_ns = self.clock.now_ns().saturating_add(backoff_ns);
            let completed = self.clock.sleep_until(wake_at_ns, shutdown);
            StepOutcome { branch: LoopState::Idle, wake_at_ns, completed }
        }
    }

    /// Step until `shutdown` is triggered, then hand back the counters
    pub fn run(mut self, shutdown: &Shutdown) -> LoopStats {
        tracing::info!("Starting {} loop towards {}", self.class, self.dest);
        while !shutdown.is_triggered() {
            self.step(shutdown);
        }
        tracing::info!(
            "{} loop stopped: {} sent, {} failed, {} idle polls",
            self.class,
            self.stats.sent,
            self.stats.send_failures,
            self.stats.idle_polls
        );
        self.stats
    }
}
