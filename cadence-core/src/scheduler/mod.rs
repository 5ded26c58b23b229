//! Scheduling loops
//!
//! One independent control loop per traffic class. Each loop owns its arrival
//! generator and counters and shares only the read-only destination and the
//! transport handle with its sibling.
//!
//! ## State machine
//!
//! ```text
//!            ready                     deadline reached
//!   Idle ───────────► Sending ───► Waiting ─────────────┐
//!    ▲ │                  ▲                             │
//!    │ │ !ready           └──────────── ready ──────────┤
//!    │ └─ sleep(idle_backoff) ◄────── !ready ───────────┘
//!    └──────┘
//! ```
//!
//! ## Drift compensation
//!
//! Wakeups are anchored to the previous scheduled deadline, not to the moment
//! the send finished, so send latency does not accumulate. A deadline already
//! in the past is not slept on. After an idle period the anchor is reset to the
//! current time, so time spent disconnected is never caught up in a burst.

pub mod control_loop;

pub use control_loop::{LoopState, SchedulingLoop, StepOutcome};
