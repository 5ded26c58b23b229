//! Experiment drivers for the `run` and `serve` commands
//!
//! Both bind one UDP transport for the client and server roles, register the
//! per-class resources when the server role is enabled, and stop when the
//! shutdown signal fires or the configured duration elapses.

use crate::config::ProfileConfig;
use crate::output::ExperimentResults;
use anyhow::{Context, Result};
use cadence_core::dispatch::ResourceDispatcher;
use cadence_core::scheduler::SchedulingLoop;
use cadence_core::threading::{LoopRuntime, Shutdown};
use cadence_core::timing::{Clock, MonotonicClock};
use cadence_transport::{SessionTransport, UdpTransport};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Run both scheduling loops against the target until shutdown
pub fn run(config: &ProfileConfig, shutdown: &Shutdown) -> Result<ExperimentResults> {
    let dest = config.destination()?;
    let transport = Arc::new(
        UdpTransport::bind(config.udp_config()?).context("Failed to bind UDP transport")?,
    );
    let session: Arc<dyn SessionTransport> = transport.clone();

    let dispatcher = if config.server.enabled { Some(serve_resources(&transport)) } else { None };

    // Loops only reconnect from their idle branch; probe once up front
    if let Err(e) = session.connect(&dest) {
        tracing::warn!("Initial session attempt with {} failed: {}", dest, e);
    }

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let mut runtime = LoopRuntime::new();
    for class in config.workload.enabled_classes() {
        let sched = SchedulingLoop::from_config(
            class,
            dest,
            session.clone(),
            clock.clone(),
            &config.workload,
            config.experiment.seed,
        )?;
        let shutdown = shutdown.clone();
        runtime.spawn(format!("cadence-{class}"), move || Ok(sched.run(&shutdown)));
    }

    let timer = arm_timer(config.experiment.duration, shutdown)?;
    let start = Instant::now();
    let loops = runtime.run();
    let elapsed = start.elapsed();

    // Loops may have stopped on error; release the timer either way
    shutdown.trigger();
    join_timer(timer);
    transport.shutdown();
    let loops = loops?;

    let mut results = ExperimentResults::new(
        config.experiment.name.clone(),
        "run",
        Some(dest.to_string()),
        transport.local_addr().to_string(),
    )
    .with_duration(elapsed);
    results.loops = loops;
    if let Some(dispatcher) = dispatcher {
        results.resources = dispatcher.snapshots();
    }
    results.transport = transport.stats().into();
    Ok(results)
}

/// Serve the per-class resources only, until shutdown
pub fn serve(config: &ProfileConfig, shutdown: &Shutdown) -> Result<ExperimentResults> {
    let transport = Arc::new(
        UdpTransport::bind(config.udp_config()?).context("Failed to bind UDP transport")?,
    );
    let dispatcher = serve_resources(&transport);

    let start = Instant::now();
    match config.experiment.duration {
        Some(duration) => {
            shutdown.wait_timeout(duration);
        }
        None => shutdown.wait(),
    }
    let elapsed = start.elapsed();
    transport.shutdown();

    let mut results = ExperimentResults::new(
        config.experiment.name.clone(),
        "serve",
        None,
        transport.local_addr().to_string(),
    )
    .with_duration(elapsed);
    results.resources = dispatcher.snapshots();
    results.transport = transport.stats().into();
    Ok(results)
}

fn serve_resources(transport: &Arc<UdpTransport>) -> ResourceDispatcher {
    tracing::info!("Started server at port {}.", transport.local_addr().port());
    let dispatcher = ResourceDispatcher::new(transport.clone());
    let report = dispatcher.register_all();
    for (class, e) in &report.failed {
        tracing::error!("Serving without the {} resource: {}", class, e);
    }
    dispatcher
}

/// Trigger `shutdown` once `duration` has elapsed
fn arm_timer(
    duration: Option<Duration>,
    shutdown: &Shutdown,
) -> Result<Option<thread::JoinHandle<()>>> {
    let Some(duration) = duration else {
        return Ok(None);
    };
    let shutdown = shutdown.clone();
    let handle = thread::Builder::new()
        .name("cadence-timer".to_string())
        .spawn(move || {
            if !shutdown.wait_timeout(duration) {
                tracing::info!("Experiment duration of {:?} elapsed", duration);
                shutdown.trigger();
            }
        })
        .context("Failed to start experiment timer")?;
    Ok(Some(handle))
}

fn join_timer(timer: Option<thread::JoinHandle<()>>) {
    if let Some(timer) = timer {
        if timer.join().is_err() {
            tracing::error!("Experiment timer panicked");
        }
    }
}
