//! Common types for cadence
//!
//! This crate provides shared building blocks used by multiple cadence crates:
//! - `traffic`: The traffic classes and their canonical resource paths
//! - `distributions`: Uniform random sources and inter-arrival samplers

pub mod distributions;
pub mod traffic;

pub use distributions::{
    Distribution, ExponentialDistribution, FixedIntervalDistribution, ScriptedUniform,
    SmallRngUniform, UniformSource, MAX_UNIFORM,
};

pub use traffic::TrafficClass;
