//! End-to-end runs over UDP loopback
//!
//! A standalone responder (transport plus dispatcher) plays the peer; the
//! experiment driver runs both loops against it.

use cadence_cli::config::ProfileConfig;
use cadence_cli::experiment;
use cadence_common::TrafficClass;
use cadence_core::dispatch::ResourceDispatcher;
use cadence_core::threading::Shutdown;
use cadence_transport::coap::{Code, Message, MessageType};
use cadence_transport::{UdpTransport, UdpTransportConfig};
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn responder() -> (Arc<UdpTransport>, ResourceDispatcher) {
    let transport = Arc::new(
        UdpTransport::bind(UdpTransportConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        })
        .unwrap(),
    );
    let dispatcher = ResourceDispatcher::new(transport.clone());
    assert!(dispatcher.register_all().is_complete());
    (transport, dispatcher)
}

fn profile(overrides: &[String]) -> ProfileConfig {
    let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
    tmpfile
        .write_all(
            br#"
[experiment]
name = "loopback-test"
seed = 11
duration = "600ms"

[server]
bind = "127.0.0.1:0"

[transport]
poll_interval = "5ms"
max_unacked = 50

[workload]
idle_backoff = "20ms"

[workload.periodic]
interval = "50ms"

[workload.aperiodic]
lambda_per_ms = 0.05
"#,
        )
        .unwrap();
    tmpfile.flush().unwrap();

    let config = ProfileConfig::from_file_with_overrides(tmpfile.path(), overrides).unwrap();
    config.validate().unwrap();
    config
}

#[test]
fn test_run_against_responder() {
    let (peer, peer_dispatcher) = responder();
    let config = profile(&[format!("target.address={}", peer.local_addr())]);

    let results = experiment::run(&config, &Shutdown::new()).unwrap();
    // Stop the peer so late datagrams cannot move its counters
    peer.shutdown();

    assert_eq!(results.mode, "run");
    assert_eq!(results.loops.len(), 2);
    assert!(results.duration_secs >= 0.5);

    let periodic = results.loops.iter().find(|l| l.class == TrafficClass::Periodic).unwrap();
    let aperiodic = results.loops.iter().find(|l| l.class == TrafficClass::Aperiodic).unwrap();
    // 600ms at 50ms, minus the time spent establishing the session
    assert!(periodic.sent >= 5, "periodic sent {}", periodic.sent);
    assert!(aperiodic.sent >= 5, "aperiodic sent {}", aperiodic.sent);

    // Every request the peer handled was acknowledged
    let handled: u64 = peer_dispatcher.snapshots().iter().map(|s| s.handled).sum();
    let acked: u64 = peer_dispatcher.snapshots().iter().map(|s| s.acks_sent).sum();
    assert!(handled > 0);
    assert_eq!(handled, acked);

    let periodic_bytes = peer_dispatcher.snapshot(TrafficClass::Periodic).bytes_received;
    assert_eq!(periodic_bytes, peer_dispatcher.snapshot(TrafficClass::Periodic).handled * 16);
    assert!(results.transport.acks_received > 0);
}

#[test]
fn test_run_with_one_loop_disabled() {
    let (peer, peer_dispatcher) = responder();
    let config = profile(&[
        format!("target.address={}", peer.local_addr()),
        "workload.aperiodic.enabled=false".to_string(),
        "workload.periodic.reconnect=true".to_string(),
        "transport.periodic_payload=42".to_string(),
    ]);

    let results = experiment::run(&config, &Shutdown::new()).unwrap();
    peer.shutdown();

    assert_eq!(results.loops.len(), 1);
    assert_eq!(results.loops[0].class, TrafficClass::Periodic);
    assert_eq!(peer_dispatcher.snapshot(TrafficClass::Aperiodic).handled, 0);
    let periodic = peer_dispatcher.snapshot(TrafficClass::Periodic);
    assert!(periodic.handled > 0);
    assert_eq!(periodic.bytes_received, periodic.handled * 42);
}

#[test]
fn test_unreachable_target_stays_idle() {
    // Nothing answers on this socket: the session never comes up
    let silent = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let config = profile(&[
        format!("target.address={}", silent.local_addr().unwrap()),
        "experiment.duration=300ms".to_string(),
    ]);

    let results = experiment::run(&config, &Shutdown::new()).unwrap();

    for l in &results.loops {
        assert_eq!(l.sent, 0, "{} loop sent without a session", l.class);
        assert!(l.idle_polls > 0);
    }
    let aperiodic = results.loops.iter().find(|l| l.class == TrafficClass::Aperiodic).unwrap();
    assert_eq!(aperiodic.reconnect_attempts, aperiodic.idle_polls);
    assert_eq!(results.transport.requests_sent, 0);
}

#[test]
fn test_shutdown_stops_run_without_duration() {
    let (peer, _peer_dispatcher) = responder();
    let mut config = profile(&[format!("target.address={}", peer.local_addr())]);
    config.experiment.duration = None;

    let shutdown = Shutdown::new();
    let stopper = shutdown.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        stopper.trigger();
    });

    let start = Instant::now();
    let results = experiment::run(&config, &shutdown).unwrap();
    handle.join().unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(results.loops.len(), 2);
}

#[test]
fn test_serve_counts_requests() {
    // Reserve a port up front so the client knows where serve listens
    let port = std::net::UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let server_addr: std::net::SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let config = profile(&[
        "experiment.duration=5s".to_string(),
        format!("server.bind={server_addr}"),
    ]);
    let shutdown = Shutdown::new();

    let serve_config = config.clone();
    let serve_shutdown = shutdown.clone();
    let server = thread::spawn(move || experiment::serve(&serve_config, &serve_shutdown));

    let client = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    client.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
    let request = Message::request(Code::POST, 0x0101, vec![7], "periodic", vec![0; 42]);
    let mut buf = [0u8; 256];
    let mut reply = None;
    // Resend until serve has bound its socket
    for _ in 0..30 {
        client.send_to(&request.encode().unwrap(), server_addr).unwrap();
        if let Ok((n, _)) = client.recv_from(&mut buf) {
            reply = Some(Message::decode(&buf[..n]).unwrap());
            break;
        }
    }
    shutdown.trigger();

    let reply = reply.expect("no acknowledgment from serve");
    assert_eq!(reply.kind, MessageType::Acknowledgement);
    assert_eq!(reply.code, Code::VALID);
    assert_eq!(reply.message_id, 0x0101);

    let results = server.join().unwrap().unwrap();
    assert_eq!(results.mode, "serve");
    assert!(results.loops.is_empty());
    assert!(results.duration_secs < 5.0);

    let periodic = results.resources.iter().find(|r| r.class == TrafficClass::Periodic).unwrap();
    assert_eq!(periodic.handled, 1);
    assert_eq!(periodic.bytes_received, 42);
    assert_eq!(periodic.acks_sent, 1);
    assert_eq!(results.transport.acks_sent, 1);
}
