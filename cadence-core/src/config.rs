//! Workload configuration
//!
//! Serializable description of the two scheduling loops. Embedded in the
//! CLI profile under `[workload]`.

use anyhow::{bail, Result};
use cadence_common::TrafficClass;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Both scheduling loops plus the shared idle backoff
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct WorkloadConfig {
    #[serde(default)]
    pub periodic: PeriodicConfig,
    #[serde(default)]
    pub aperiodic: AperiodicConfig,
    /// Sleep between polls while the session is down
    #[serde(with = "humantime_serde", default = "default_idle_backoff")]
    #[cfg_attr(feature = "schema", schemars(with = "String"))]
    pub idle_backoff: Duration,
}

/// Fixed-interval traffic
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct PeriodicConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Gap between consecutive periodic requests
    #[serde(with = "humantime_serde", default = "default_periodic_interval")]
    #[cfg_attr(feature = "schema", schemars(with = "String"))]
    pub interval: Duration,
    /// Start a session attempt on each idle poll
    #[serde(default)]
    pub reconnect: bool,
}

/// Poisson traffic
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct AperiodicConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Arrival rate in requests per millisecond (mean gap is 1/λ ms)
    #[serde(default = "default_lambda_per_ms")]
    pub lambda_per_ms: f64,
    /// Start a session attempt on each idle poll
    #[serde(default = "default_true")]
    pub reconnect: bool,
}

pub const DEFAULT_LAMBDA_PER_MS: f64 = 0.1;
pub const DEFAULT_PERIODIC_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_millis(500);

fn default_true() -> bool {
    true
}

fn default_lambda_per_ms() -> f64 {
    DEFAULT_LAMBDA_PER_MS
}

fn default_periodic_interval() -> Duration {
    DEFAULT_PERIODIC_INTERVAL
}

fn default_idle_backoff() -> Duration {
    DEFAULT_IDLE_BACKOFF
}

impl Default for PeriodicConfig {
    fn default() -> Self {
        Self { enabled: true, interval: DEFAULT_PERIODIC_INTERVAL, reconnect: false }
    }
}

impl Default for AperiodicConfig {
    fn default() -> Self {
        Self { enabled: true, lambda_per_ms: DEFAULT_LAMBDA_PER_MS, reconnect: true }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            periodic: PeriodicConfig::default(),
            aperiodic: AperiodicConfig::default(),
            idle_backoff: DEFAULT_IDLE_BACKOFF,
        }
    }
}

impl WorkloadConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.periodic.interval.is_zero() {
            bail!("workload.periodic.interval must be greater than zero");
        }
        let lambda = self.aperiodic.lambda_per_ms;
        if !lambda.is_finite() || lambda <= 0.0 {
            bail!("workload.aperiodic.lambda_per_ms must be a positive finite number, got {lambda}");
        }
        if self.idle_backoff.is_zero() {
            bail!("workload.idle_backoff must be greater than zero");
        }
        if !self.periodic.enabled && !self.aperiodic.enabled {
            bail!("at least one of workload.periodic and workload.aperiodic must be enabled");
        }
        Ok(())
    }

    pub fn is_enabled(&self, class: TrafficClass) -> bool {
        match class {
            TrafficClass::Periodic => self.periodic.enabled,
            TrafficClass::Aperiodic => self.aperiodic.enabled,
        }
    }

    /// Whether the loop for `class` attempts to reconnect while idle
    pub fn reconnects(&self, class: TrafficClass) -> bool {
        match class {
            TrafficClass::Periodic => self.periodic.reconnect,
            TrafficClass::Aperiodic => self.aperiodic.reconnect,
        }
    }

    /// Classes with an enabled loop, in start order
    pub fn enabled_classes(&self) -> Vec<TrafficClass> {
        TrafficClass::ALL.into_iter().filter(|c| self.is_enabled(*c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkloadConfig::default();
        assert_eq!(config.periodic.interval, Duration::from_secs(1));
        assert_eq!(config.aperiodic.lambda_per_ms, 0.1);
        assert_eq!(config.idle_backoff, Duration::from_millis(500));
        assert!(config.reconnects(TrafficClass::Aperiodic));
        assert!(!config.reconnects(TrafficClass::Periodic));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_lambda() {
        for lambda in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut config = WorkloadConfig::default();
            config.aperiodic.lambda_per_ms = lambda;
            assert!(config.validate().is_err(), "lambda {lambda} accepted");
        }
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let mut config = WorkloadConfig::default();
        config.periodic.interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = WorkloadConfig::default();
        config.idle_backoff = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_one_loop() {
        let mut config = WorkloadConfig::default();
        config.periodic.enabled = false;
        assert_eq!(config.enabled_classes(), vec![TrafficClass::Aperiodic]);
        config.aperiodic.enabled = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml_with_defaults() {
        let config: WorkloadConfig = toml::from_str(
            r#"
            idle_backoff = "250ms"

            [periodic]
            interval = "2s"
            reconnect = true

            [aperiodic]
            lambda_per_ms = 0.05
            "#,
        )
        .unwrap();

        assert_eq!(config.idle_backoff, Duration::from_millis(250));
        assert_eq!(config.periodic.interval, Duration::from_secs(2));
        assert!(config.periodic.enabled);
        assert!(config.reconnects(TrafficClass::Periodic));
        assert_eq!(config.aperiodic.lambda_per_ms, 0.05);
        assert!(config.aperiodic.reconnect);
    }

    #[test]
    fn test_parse_empty_table() {
        let config: WorkloadConfig = toml::from_str("").unwrap();
        assert_eq!(config, WorkloadConfig::default());
    }
}
