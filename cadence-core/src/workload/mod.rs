//! Workload generation

pub mod arrival;

// Re-export distributions from cadence-common
pub use cadence_common::distributions;
pub use cadence_common::{Distribution, ExponentialDistribution, FixedIntervalDistribution};

pub use arrival::ArrivalTimeGenerator;
