//! Cadence CLI library
//!
//! This library exposes configuration types and the experiment drivers for
//! testing and potential reuse.

pub mod config;
pub mod experiment;
pub mod output;
