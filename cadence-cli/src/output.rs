//! Results output formatting

use anyhow::{Context, Result};
use cadence_core::stats::{DispatchSnapshot, LoopStats};
use cadence_transport::udp::TransportStats;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Experiment results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResults {
    pub name: String,
    /// "run" or "serve"
    pub mode: String,
    pub target: Option<String>,
    pub local: String,
    pub duration_secs: f64,
    /// One entry per loop that ran
    pub loops: Vec<LoopStats>,
    /// One entry per resource class, empty when the server role is disabled
    pub resources: Vec<DispatchSnapshot>,
    pub transport: TransportSummary,
}

/// Datagram-level counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSummary {
    pub requests_sent: u64,
    pub acks_received: u64,
    /// 4.xx/5.xx replies to our requests
    pub error_replies: u64,
    /// Requests whose acknowledgment never arrived in time
    pub ack_timeouts: u64,
    pub acks_sent: u64,
    pub pings_sent: u64,
    pub malformed: u64,
}

impl From<TransportStats> for TransportSummary {
    fn from(stats: TransportStats) -> Self {
        Self {
            requests_sent: stats.requests_sent,
            acks_received: stats.acks_received,
            error_replies: stats.error_replies,
            ack_timeouts: stats.ack_timeouts,
            acks_sent: stats.acks_sent,
            pings_sent: stats.pings_sent,
            malformed: stats.malformed,
        }
    }
}

impl ExperimentResults {
    pub fn new(name: String, mode: &str, target: Option<String>, local: String) -> Self {
        Self {
            name,
            mode: mode.to_string(),
            target,
            local,
            duration_secs: 0.0,
            loops: Vec::new(),
            resources: Vec::new(),
            transport: TransportSummary::default(),
        }
    }

    pub fn with_duration(mut self, elapsed: Duration) -> Self {
        self.duration_secs = elapsed.as_secs_f64();
        self
    }

    /// Requests accepted by the transport across all loops
    pub fn total_sent(&self) -> u64 {
        self.loops.iter().map(|l| l.sent).sum()
    }

    /// Average send rate over the run
    pub fn send_rate(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.total_sent() as f64 / self.duration_secs
        } else {
            0.0
        }
    }

    /// Print results to stdout in human-readable format
    pub fn print_human(&self) {
        println!("\n{}", "=".repeat(60));
        println!("Cadence Workload Results");
        println!("{}", "=".repeat(60));
        println!();
        println!("Configuration:");
        println!("  Experiment:      {}", self.name);
        println!("  Mode:            {}", self.mode);
        if let Some(target) = &self.target {
            println!("  Target:          {}", target);
        }
        println!("  Local:           {}", self.local);
        println!("  Duration:        {:.2}s", self.duration_secs);

        if !self.loops.is_empty() {
            println!();
            println!("Scheduling loops:");
            for l in &self.loops {
                println!(
                    "  {:<10}       sent {}, failed {}, idle polls {}, reconnects {}, late {}",
                    l.class,
                    l.sent,
                    l.send_failures,
                    l.idle_polls,
                    l.reconnect_attempts,
                    l.late_wakeups
                );
            }
            println!("  Rate:            {:.2} req/s", self.send_rate());
        }

        if !self.resources.is_empty() {
            println!();
            println!("Resources:");
            for r in &self.resources {
                println!(
                    "  /{:<10}      handled {}, bytes {}, acks {}, ack failures {}",
                    r.class, r.handled, r.bytes_received, r.acks_sent, r.ack_failures
                );
            }
        }

        println!();
        println!("Transport:");
        println!("  Requests sent:   {}", self.transport.requests_sent);
        println!("  Acks received:   {}", self.transport.acks_received);
        println!("  Error replies:   {}", self.transport.error_replies);
        println!("  Ack timeouts:    {}", self.transport.ack_timeouts);
        println!("  Acks sent:       {}", self.transport.acks_sent);
        println!("  Probes sent:     {}", self.transport.pings_sent);
        println!("  Malformed:       {}", self.transport.malformed);
        println!();
        println!("{}", "=".repeat(60));
    }

    /// Write results to JSON file
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_common::TrafficClass;

    fn sample() -> ExperimentResults {
        let mut periodic = LoopStats::new(TrafficClass::Periodic);
        periodic.sent = 10;
        let mut aperiodic = LoopStats::new(TrafficClass::Aperiodic);
        aperiodic.sent = 990;
        aperiodic.send_failures = 4;

        let mut results = ExperimentResults::new(
            "lab".to_string(),
            "run",
            Some("[2001:db8::1]:5684".to_string()),
            "[::]:5684".to_string(),
        )
        .with_duration(Duration::from_secs(10));
        results.loops = vec![aperiodic, periodic];
        results
    }

    #[test]
    fn test_experiment_results_rate() {
        let results = sample();
        assert_eq!(results.total_sent(), 1000);
        assert_eq!(results.duration_secs, 10.0);
        assert_eq!(results.send_rate(), 100.0);
    }

    #[test]
    fn test_zero_duration_rate() {
        let results = ExperimentResults::new("x".into(), "serve", None, "[::]:1".into());
        assert_eq!(results.send_rate(), 0.0);
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        sample().write_json(&path).unwrap();

        let parsed: ExperimentResults =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.name, "lab");
        assert_eq!(parsed.loops.len(), 2);
        assert_eq!(parsed.loops[0].class, TrafficClass::Aperiodic);
        assert_eq!(parsed.loops[0].send_failures, 4);
        assert_eq!(parsed.transport, TransportSummary::default());
    }
}
