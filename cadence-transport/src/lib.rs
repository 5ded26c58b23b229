//! Cadence Transport Layer
//!
//! This crate defines the narrow interface the cadence workload core consumes from
//! its request/response transport, plus a datagram implementation of it.
//!
//! ## The `SessionTransport` interface
//!
//! The core never touches sockets, handshakes or retransmission. It only needs:
//!
//! - a connectivity query (`is_session_established`)
//! - a non-blocking request send for a traffic class (`send_request`)
//! - a registration point for inbound request handlers (`register_resource`)
//! - an acknowledgment primitive tied to one inbound request (`send_ack`)
//! - a non-blocking session attempt (`connect`)
//!
//! All methods take `&self`: a transport is shared between the scheduling loops
//! and its own dispatch context, so implementations synchronize internally.
//!
//! ## Available Transports
//!
//! - **UDP**: CoAP-framed confirmable requests over a single non-blocking UDP
//!   socket, with a `mio`-driven dispatch thread. Plaintext; intended for lab
//!   and loopback runs in place of a secure datagram transport.
//!
//! ```rust,no_run
//! use cadence_transport::{Destination, SessionTransport, UdpTransport, UdpTransportConfig};
//! use cadence_common::TrafficClass;
//!
//! let transport = UdpTransport::bind(UdpTransportConfig::default()).unwrap();
//! let dest: Destination = "[::1]:5684".parse().unwrap();
//!
//! transport.connect(&dest).unwrap();
//! if transport.is_session_established() {
//!     transport.send_request(TrafficClass::Periodic, &dest).unwrap();
//! }
//! ```

use cadence_common::TrafficClass;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

pub mod coap;
pub mod resource;
pub mod udp;

pub use resource::ResourceTable;
pub use udp::{UdpTransport, UdpTransportConfig};

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transport layer error types
#[derive(Debug)]
pub enum Error {
    /// I/O errors from the socket layer
    Io(std::io::Error),

    /// Session errors (not established, lost, unreachable peer)
    Connection(String),

    /// Malformed datagrams
    Codec(String),

    /// Resource registration errors
    Registration(String),

    /// Other errors
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Connection(msg) => write!(f, "Connection error: {msg}"),
            Error::Codec(msg) => write!(f, "Codec error: {msg}"),
            Error::Registration(msg) => write!(f, "Registration error: {msg}"),
            Error::Other(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

/// Address and port requests are sent to.
///
/// Read-only once configured; cheap to copy into each scheduling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination(SocketAddr);

impl Destination {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Destination {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for Destination {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<SocketAddr>()
            .map(Self)
            .map_err(|e| Error::Other(format!("Invalid destination '{s}': {e}")))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation data identifying one inbound request.
///
/// An acknowledgment built from this context answers exactly that request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Socket address the request came from
    pub peer: SocketAddr,
    /// Message id of the request
    pub message_id: u16,
    /// Request token (0-8 bytes)
    pub token: Vec<u8>,
}

/// Transient view over one received request, valid for the duration of a
/// handler call.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Resource path the request was routed to
    pub path: String,
    /// Number of payload bytes
    pub payload_len: usize,
    /// Correlation data for the acknowledgment
    pub context: RequestContext,
}

impl InboundRequest {
    /// Sender IP address (without port)
    pub fn sender_address(&self) -> IpAddr {
        self.context.peer.ip()
    }

    /// Traffic class of the resource the request was routed to, if any
    pub fn class(&self) -> Option<TrafficClass> {
        TrafficClass::from_path(&self.path)
    }
}

/// Handler invoked on the transport's dispatch context for a registered path.
///
/// Handlers must return promptly and must not block.
pub type ResourceHandler = Arc<dyn Fn(&InboundRequest) + Send + Sync>;

/// Request/response transport consumed by the workload core
pub trait SessionTransport: Send + Sync {
    /// Whether a session with the peer is currently established
    ///
    /// Non-blocking, idempotent, no side effects.
    fn is_session_established(&self) -> bool;

    /// Start a session attempt towards `dest`
    ///
    /// Returns once the attempt has been initiated; completion is observed
    /// through `is_session_established`.
    fn connect(&self, dest: &Destination) -> Result<()>;

    /// Send one request of `class` to `dest` without blocking
    fn send_request(&self, class: TrafficClass, dest: &Destination) -> Result<()>;

    /// Register a handler for inbound requests addressed to `path`
    fn register_resource(&self, path: &str, handler: ResourceHandler) -> Result<()>;

    /// Acknowledge the inbound request identified by `context`
    fn send_ack(&self, context: &RequestContext) -> Result<()>;
}
