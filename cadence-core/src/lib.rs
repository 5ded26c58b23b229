//! Cadence Core Library
//!
//! This crate provides the workload controller for cadence: arrival-time
//! generation, the connection guard, the request emitter, the per-class
//! scheduling loops, the server-side resource dispatcher, and the threading
//! runtime and clock they run on.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod emitter;
pub mod error;
pub mod scheduler;
pub mod seed;
pub mod stats;
pub mod threading;
pub mod timing;
pub mod workload;

#[cfg(test)]
pub(crate) mod testing;

// Re-export transport types from cadence-transport
pub use cadence_transport::{Destination, InboundRequest, RequestContext, SessionTransport};

pub use error::{Error, Result};
