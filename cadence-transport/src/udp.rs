//! UDP transport implementation using non-blocking I/O
//!
//! `UdpTransport` carries CoAP-framed requests and acknowledgments over a single
//! UDP socket that serves both roles: the scheduling loops send confirmable
//! requests from it, and a dispatch thread receives on it, routing inbound
//! requests to registered resources and tracking acknowledgments for the
//! client side.
//!
//! ## Session model
//!
//! There is no handshake and no encryption. A "session" is established when the
//! peer answers a CoAP ping (empty confirmable message) with a reset. Every
//! confirmable request is then tracked by `(peer, message id)` until a
//! matching acknowledgment arrives or `ack_timeout` expires. The session is
//! considered lost once more than `max_unacked` consecutive requests fail,
//! either by expiring or by drawing a 4.xx/5.xx reply. A 2.xx acknowledgment
//! resets the count. Nothing is retransmitted.

use crate::coap::{Code, Message, MessageType};
use crate::{
    Destination, Error, InboundRequest, RequestContext, ResourceHandler, ResourceTable, Result,
    SessionTransport,
};
use cadence_common::TrafficClass;
use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const DEFAULT_UDP_BUFFER_SIZE: usize = 65535;
const SOCKET: Token = Token(0);

/// Default CoAP-over-DTLS port
pub const DEFAULT_PORT: u16 = 5684;

/// Configuration for the UDP transport
#[derive(Debug, Clone)]
pub struct UdpTransportConfig {
    /// Local address to bind (both client and server role)
    pub bind: SocketAddr,
    /// Consecutive failed confirmable requests tolerated before the session is dropped
    pub max_unacked: u32,
    /// How long a request may wait for its acknowledgment before it counts as failed
    pub ack_timeout: Duration,
    /// Payload size of periodic requests in bytes
    pub periodic_payload: usize,
    /// Payload size of aperiodic requests in bytes
    pub aperiodic_payload: usize,
    /// Upper bound on how long the dispatch thread blocks in one poll
    pub poll_interval: Duration,
}

impl Default for UdpTransportConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((std::net::Ipv6Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_unacked: 3,
            ack_timeout: Duration::from_secs(2),
            periodic_payload: 16,
            aperiodic_payload: 16,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl UdpTransportConfig {
    fn payload_size(&self, class: TrafficClass) -> usize {
        match class {
            TrafficClass::Periodic => self.periodic_payload,
            TrafficClass::Aperiodic => self.aperiodic_payload,
        }
    }
}

/// Counters maintained by the transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub acks_received: u64,
    pub error_replies: u64,
    pub ack_timeouts: u64,
    pub acks_sent: u64,
    pub pings_sent: u64,
    pub malformed: u64,
}

#[derive(Default)]
struct Counters {
    requests_sent: AtomicU64,
    acks_received: AtomicU64,
    error_replies: AtomicU64,
    ack_timeouts: AtomicU64,
    acks_sent: AtomicU64,
    pings_sent: AtomicU64,
    malformed: AtomicU64,
}

/// A confirmable request awaiting its acknowledgment
#[derive(Debug, Clone, Copy)]
struct Outstanding {
    peer: SocketAddr,
    deadline: Instant,
}

struct Inner {
    socket: UdpSocket,
    config: UdpTransportConfig,
    resources: ResourceTable,
    established: AtomicBool,
    failures: AtomicU32,
    outstanding: Mutex<HashMap<u16, Outstanding>>,
    pending_ping: Mutex<Option<(SocketAddr, u16)>>,
    next_message_id: AtomicU16,
    running: AtomicBool,
    counters: Counters,
}

impl Inner {
    fn next_message_id(&self) -> u16 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    fn send_message(&self, msg: &Message, target: SocketAddr) -> Result<()> {
        let bytes = msg.encode()?;
        self.socket.send_to(&bytes, target)?;
        Ok(())
    }

    fn handle_datagram(&self, data: &[u8], src: SocketAddr) {
        let msg = match Message::decode(data) {
            Ok(msg) => msg,
            Err(e) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Dropping malformed datagram from {}: {}", src, e);
                return;
            }
        };

        let kind = msg.kind;
        match kind {
            MessageType::Confirmable | MessageType::NonConfirmable if msg.is_ping() => {
                if let Err(e) = self.send_message(&Message::reset(msg.message_id), src) {
                    tracing::warn!("Failed to answer ping from {}: {}", src, e);
                }
            }
            MessageType::Confirmable | MessageType::NonConfirmable if msg.code.is_request() => {
                self.dispatch_request(msg, src);
            }
            MessageType::Acknowledgement => self.handle_ack(&msg, src),
            MessageType::Reset => self.handle_reset(msg.message_id, src),
            _ => {
                tracing::debug!("Ignoring {:?} {} from {}", kind, msg.code, src);
            }
        }
    }

    fn dispatch_request(&self, msg: Message, src: SocketAddr) {
        let path = msg.path();
        let Some(handler) = self.resources.get(&path) else {
            tracing::debug!("No resource '{}' for request from {}", path, src);
            if msg.kind == MessageType::Confirmable {
                let not_found = Message::ack(Code::NOT_FOUND, msg.message_id, msg.token);
                if let Err(e) = self.send_message(&not_found, src) {
                    tracing::warn!("Failed to send 4.04 to {}: {}", src, e);
                }
            }
            return;
        };

        let request = InboundRequest {
            path,
            payload_len: msg.payload.len(),
            context: RequestContext { peer: src, message_id: msg.message_id, token: msg.token },
        };
        handler(&request);
    }

    fn outstanding(&self) -> std::sync::MutexGuard<'_, HashMap<u16, Outstanding>> {
        match self.outstanding.lock() {
            Ok(outstanding) => outstanding,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn handle_ack(&self, msg: &Message, src: SocketAddr) {
        let matched = {
            let mut outstanding = self.outstanding();
            match outstanding.get(&msg.message_id) {
                Some(entry) if entry.peer == src => outstanding.remove(&msg.message_id).is_some(),
                _ => false,
            }
        };
        if !matched {
            tracing::debug!(
                "Ignoring unmatched ack {} ({}) from {}",
                msg.message_id,
                msg.code,
                src
            );
            return;
        }

        // An empty ack confirms receipt ahead of a separate response
        if msg.code.is_success() || msg.code.is_empty() {
            self.counters.acks_received.fetch_add(1, Ordering::Relaxed);
            self.failures.store(0, Ordering::Release);
        } else {
            self.counters.error_replies.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Request {} rejected by {} with {}", msg.message_id, src, msg.code);
            self.record_failures(1, src);
        }
    }

    /// Drop requests whose acknowledgment is overdue
    fn expire_outstanding(&self, now: Instant) {
        let expired: Vec<SocketAddr> = {
            let mut outstanding = self.outstanding();
            let mut expired = Vec::new();
            outstanding.retain(|_, entry| {
                let live = entry.deadline > now;
                if !live {
                    expired.push(entry.peer);
                }
                live
            });
            expired
        };
        if let Some(peer) = expired.first() {
            self.counters.ack_timeouts.fetch_add(expired.len() as u64, Ordering::Relaxed);
            self.record_failures(expired.len() as u32, *peer);
        }
    }

    fn record_failures(&self, count: u32, peer: SocketAddr) {
        let failures = self.failures.fetch_add(count, Ordering::AcqRel).saturating_add(count);
        if failures > self.config.max_unacked && self.established.swap(false, Ordering::AcqRel) {
            tracing::warn!("Session with {} lost after {} failed requests", peer, failures);
        }
    }

    fn handle_reset(&self, message_id: u16, src: SocketAddr) {
        let mut pending = match self.pending_ping.lock() {
            Ok(pending) => pending,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *pending == Some((src, message_id)) {
            *pending = None;
            self.failures.store(0, Ordering::Release);
            self.outstanding().clear();
            if !self.established.swap(true, Ordering::AcqRel) {
                tracing::info!("Session with {} established", src);
            }
        } else {
            tracing::debug!("Unexpected reset {} from {}", message_id, src);
        }
    }
}

/// CoAP-framed UDP transport with its own dispatch thread
pub struct UdpTransport {
    inner: Arc<Inner>,
    local_addr: SocketAddr,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl UdpTransport {
    /// Bind the socket and start the dispatch thread
    pub fn bind(config: UdpTransportConfig) -> Result<Self> {
        let std_socket = std::net::UdpSocket::bind(config.bind)?;
        std_socket.set_nonblocking(true)?;
        let local_addr = std_socket.local_addr()?;

        let mut socket = UdpSocket::from_std(std_socket);
        let poll = Poll::new()?;
        poll.registry().register(&mut socket, SOCKET, Interest::READABLE)?;

        let inner = Arc::new(Inner {
            socket,
            config,
            resources: ResourceTable::new(),
            established: AtomicBool::new(false),
            failures: AtomicU32::new(0),
            outstanding: Mutex::new(HashMap::new()),
            pending_ping: Mutex::new(None),
            next_message_id: AtomicU16::new(rand::random::<u16>()),
            running: AtomicBool::new(true),
            counters: Counters::default(),
        });

        let thread_inner = inner.clone();
        let handle = thread::Builder::new()
            .name("cadence-dispatch".to_string())
            .spawn(move || dispatch_loop(thread_inner, poll))
            .map_err(Error::Io)?;

        tracing::info!("UDP transport listening on {}", local_addr);

        Ok(Self { inner, local_addr, dispatch: Mutex::new(Some(handle)) })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> TransportStats {
        let c = &self.inner.counters;
        TransportStats {
            requests_sent: c.requests_sent.load(Ordering::Relaxed),
            acks_received: c.acks_received.load(Ordering::Relaxed),
            error_replies: c.error_replies.load(Ordering::Relaxed),
            ack_timeouts: c.ack_timeouts.load(Ordering::Relaxed),
            acks_sent: c.acks_sent.load(Ordering::Relaxed),
            pings_sent: c.pings_sent.load(Ordering::Relaxed),
            malformed: c.malformed.load(Ordering::Relaxed),
        }
    }

    /// Stop the dispatch thread
    ///
    /// Safe to call more than once. Requests can no longer be received
    /// afterwards, so the session is reported as down.
    pub fn shutdown(&self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.established.store(false, Ordering::Release);

        let handle = match self.dispatch.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            // The last reference may be released by a handler on the dispatch thread itself
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::error!("UDP dispatch thread panicked");
            }
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl SessionTransport for UdpTransport {
    fn is_session_established(&self) -> bool {
        self.inner.established.load(Ordering::Acquire)
    }

    fn connect(&self, dest: &Destination) -> Result<()> {
        if !self.inner.running.load(Ordering::Acquire) {
            return Err(Error::Connection("transport is shut down".to_string()));
        }

        let message_id = self.inner.next_message_id();
        {
            let mut pending = match self.inner.pending_ping.lock() {
                Ok(pending) => pending,
                Err(poisoned) => poisoned.into_inner(),
            };
            *pending = Some((dest.addr(), message_id));
        }

        self.inner.send_message(&Message::ping(message_id), dest.addr())?;
        self.inner.counters.pings_sent.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Sent session probe {} to {}", message_id, dest);
        Ok(())
    }

    fn send_request(&self, class: TrafficClass, dest: &Destination) -> Result<()> {
        self.inner.expire_outstanding(Instant::now());
        if !self.is_session_established() {
            return Err(Error::Connection(format!("no session with {dest}")));
        }

        let message_id = self.inner.next_message_id();
        let payload = vec![class.path().as_bytes()[0]; self.inner.config.payload_size(class)];
        let msg = Message::request(
            Code::POST,
            message_id,
            message_id.to_be_bytes().to_vec(),
            class.path(),
            payload,
        );
        // Tracked before sending so a fast ack cannot race the insert
        let deadline = Instant::now()
            .checked_add(self.inner.config.ack_timeout)
            .ok_or_else(|| Error::Other("ack timeout out of range".to_string()))?;
        self.inner
            .outstanding()
            .insert(message_id, Outstanding { peer: dest.addr(), deadline });
        if let Err(e) = self.inner.send_message(&msg, dest.addr()) {
            self.inner.outstanding().remove(&message_id);
            return Err(e);
        }
        self.inner.counters.requests_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn register_resource(&self, path: &str, handler: ResourceHandler) -> Result<()> {
        self.inner.resources.insert(path, handler)
    }

    fn send_ack(&self, context: &RequestContext) -> Result<()> {
        let ack = Message::ack(Code::VALID, context.message_id, context.token.clone());
        self.inner.send_message(&ack, context.peer)?;
        self.inner.counters.acks_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn dispatch_loop(inner: Arc<Inner>, mut poll: Poll) {
    let mut events = Events::with_capacity(16);
    let mut buf = vec![0u8; DEFAULT_UDP_BUFFER_SIZE];

    while inner.running.load(Ordering::Acquire) {
        if let Err(e) = poll.poll(&mut events, Some(inner.config.poll_interval)) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            tracing::error!("UDP dispatch poll failed: {}", e);
            break;
        }
        inner.expire_outstanding(Instant::now());

        for event in events.iter() {
            if event.token() != SOCKET {
                continue;
            }
            // Edge-triggered: drain until WouldBlock
            loop {
                match inner.socket.recv_from(&mut buf) {
                    Ok((n, src)) => inner.handle_datagram(&buf[..n], src),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    // ICMP unreachable surfaces here on some platforms
                    Err(e) => tracing::debug!("UDP receive error: {}", e),
                }
            }
        }
    }
}
