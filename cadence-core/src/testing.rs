//! In-memory session transport for unit tests

use crate::timing::{Clock, ManualClock};
use cadence_common::TrafficClass;
use cadence_transport::{
    Destination, Error, InboundRequest, RequestContext, ResourceHandler, ResourceTable, Result,
    SessionTransport,
};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    pub class: TrafficClass,
    pub dest: Destination,
    /// Clock reading at send time, 0 without a clock
    pub at_ns: u64,
}

/// Scriptable [`SessionTransport`]
pub struct MockTransport {
    ready_script: Mutex<VecDeque<bool>>,
    ready_default: AtomicBool,
    ready_queries: AtomicU64,
    connects: AtomicU64,
    fail_connects: AtomicBool,
    failing_classes: Mutex<HashSet<TrafficClass>>,
    sends: Mutex<Vec<SentRequest>>,
    acks: Mutex<Vec<RequestContext>>,
    fail_acks: AtomicBool,
    rejected_paths: Mutex<HashSet<String>>,
    resources: ResourceTable,
    clock: Option<Arc<ManualClock>>,
    send_delays: Mutex<VecDeque<Duration>>,
}

impl MockTransport {
    /// Always-ready transport with no clock
    pub fn new() -> Self {
        Self {
            ready_script: Mutex::new(VecDeque::new()),
            ready_default: AtomicBool::new(true),
            ready_queries: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            fail_connects: AtomicBool::new(false),
            failing_classes: Mutex::new(HashSet::new()),
            sends: Mutex::new(Vec::new()),
            acks: Mutex::new(Vec::new()),
            fail_acks: AtomicBool::new(false),
            rejected_paths: Mutex::new(HashSet::new()),
            resources: ResourceTable::new(),
            clock: None,
            send_delays: Mutex::new(VecDeque::new()),
        }
    }

    /// Stamp each send with `clock.now_ns()`
    pub fn with_clock(clock: Arc<ManualClock>) -> Self {
        Self { clock: Some(clock), ..Self::new() }
    }

    /// Virtual time each successive send takes, advanced on the clock after stamping
    pub fn script_send_delays(&self, delays: impl IntoIterator<Item = Duration>) {
        self.send_delays.lock().unwrap().extend(delays);
    }

    /// Readiness answers to hand out before falling back to the default
    pub fn script_ready(&self, answers: impl IntoIterator<Item = bool>) {
        self.ready_script.lock().unwrap().extend(answers);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready_default.store(ready, Ordering::SeqCst);
    }

    pub fn ready_queries(&self) -> u64 {
        self.ready_queries.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, class: TrafficClass, fail: bool) {
        let mut failing = self.failing_classes.lock().unwrap();
        if fail {
            failing.insert(class);
        } else {
            failing.remove(&class);
        }
    }

    pub fn sends(&self) -> Vec<SentRequest> {
        self.sends.lock().unwrap().clone()
    }

    pub fn sends_of(&self, class: TrafficClass) -> Vec<SentRequest> {
        self.sends().into_iter().filter(|s| s.class == class).collect()
    }

    pub fn acks(&self) -> Vec<RequestContext> {
        self.acks.lock().unwrap().clone()
    }

    pub fn fail_acks(&self, fail: bool) {
        self.fail_acks.store(fail, Ordering::SeqCst);
    }

    pub fn reject_registration(&self, path: &str) {
        self.rejected_paths.lock().unwrap().insert(path.to_string());
    }

    pub fn registered_paths(&self) -> Vec<String> {
        self.resources.paths()
    }

    /// Route `request` to its registered handler, as the dispatch thread would
    ///
    /// # Returns
    /// `false` if no handler is registered for the path
    pub fn deliver(&self, request: &InboundRequest) -> bool {
        match self.resources.get(&request.path) {
            Some(handler) => {
                handler(request);
                true
            }
            None => false,
        }
    }
}

impl SessionTransport for MockTransport {
    fn is_session_established(&self) -> bool {
        self.ready_queries.fetch_add(1, Ordering::SeqCst);
        match self.ready_script.lock().unwrap().pop_front() {
            Some(ready) => ready,
            None => self.ready_default.load(Ordering::SeqCst),
        }
    }

    fn connect(&self, _dest: &Destination) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(Error::Connection("peer unreachable".to_string()));
        }
        Ok(())
    }

    fn send_request(&self, class: TrafficClass, dest: &Destination) -> Result<()> {
        if self.failing_classes.lock().unwrap().contains(&class) {
            return Err(Error::Connection(format!("{class} send refused")));
        }
        let at_ns = self.clock.as_ref().map_or(0, |c| c.now_ns());
        self.sends.lock().unwrap().push(SentRequest { class, dest: *dest, at_ns });
        if let (Some(clock), Some(delay)) =
            (self.clock.as_ref(), self.send_delays.lock().unwrap().pop_front())
        {
            clock.advance(delay);
        }
        Ok(())
    }

    fn register_resource(&self, path: &str, handler: ResourceHandler) -> Result<()> {
        if self.rejected_paths.lock().unwrap().contains(path) {
            return Err(Error::Registration(format!("resource '{path}' rejected")));
        }
        self.resources.insert(path, handler)
    }

    fn send_ack(&self, context: &RequestContext) -> Result<()> {
        if self.fail_acks.load(Ordering::SeqCst) {
            return Err(Error::Connection("ack buffer exhausted".to_string()));
        }
        self.acks.lock().unwrap().push(context.clone());
        Ok(())
    }
}
