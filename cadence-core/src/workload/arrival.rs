//! Inter-arrival times per traffic class
//!
//! Periodic traffic waits a constant interval. Aperiodic traffic is a Poisson
//! process: each gap is an independent exponential draw with rate λ (arrivals
//! per millisecond), obtained by inverse transform of one uniform sample.

use crate::config::WorkloadConfig;
use crate::seed::{components, derive_seed};
use cadence_common::{
    Distribution, ExponentialDistribution, FixedIntervalDistribution, TrafficClass, UniformSource,
};
use std::time::Duration;

/// Produces the next wait duration for each traffic class
pub struct ArrivalTimeGenerator {
    /// Periodic gap in milliseconds
    periodic: FixedIntervalDistribution,
    /// Aperiodic gap in milliseconds
    aperiodic: ExponentialDistribution,
}

impl ArrivalTimeGenerator {
    /// Create a generator with an entropy-seeded uniform source
    ///
    /// # Returns
    /// Error if `lambda_per_ms` is not a finite value > 0
    pub fn new(periodic_interval: Duration, lambda_per_ms: f64) -> anyhow::Result<Self> {
        Self::with_seed(periodic_interval, lambda_per_ms, None)
    }

    /// Create a generator whose aperiodic draws are reproducible for a given seed
    pub fn with_seed(
        periodic_interval: Duration,
        lambda_per_ms: f64,
        seed: Option<u64>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            periodic: periodic_ms(periodic_interval)?,
            aperiodic: ExponentialDistribution::with_seed(lambda_per_ms, seed)?,
        })
    }

    /// Create a generator over an explicit uniform source
    pub fn with_source(
        periodic_interval: Duration,
        lambda_per_ms: f64,
        source: Box<dyn UniformSource>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            periodic: periodic_ms(periodic_interval)?,
            aperiodic: ExponentialDistribution::with_source(lambda_per_ms, source)?,
        })
    }

    /// Build from the workload section of a profile
    ///
    /// The aperiodic seed is derived from `master_seed` so that it is stable
    /// across runs but independent of any other seeded component.
    pub fn from_config(config: &WorkloadConfig, master_seed: Option<u64>) -> anyhow::Result<Self> {
        let seed = master_seed.map(|s| derive_seed(s, components::APERIODIC_ARRIVALS));
        Self::with_seed(config.periodic.interval, config.aperiodic.lambda_per_ms, seed)
    }

    /// The configured constant; no randomness involved
    pub fn next_periodic_wait(&self) -> Duration {
        ms_to_duration(self.periodic.value())
    }

    /// One fresh exponential draw, never negative, NaN or infinite
    pub fn next_aperiodic_wait(&mut self) -> Duration {
        ms_to_duration(self.aperiodic.sample())
    }

    /// Next wait for `class`
    pub fn next(&mut self, class: TrafficClass) -> Duration {
        match class {
            TrafficClass::Periodic => self.next_periodic_wait(),
            TrafficClass::Aperiodic => self.next_aperiodic_wait(),
        }
    }
}

fn periodic_ms(interval: Duration) -> anyhow::Result<FixedIntervalDistribution> {
    if interval.is_zero() {
        anyhow::bail!("Periodic interval must be greater than zero");
    }
    FixedIntervalDistribution::new(interval.as_secs_f64() * 1000.0)
}

/// Milliseconds to `Duration`, saturating on overflow
fn ms_to_duration(ms: f64) -> Duration {
    Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_common::ScriptedUniform;

    fn scripted(values: Vec<f64>) -> ArrivalTimeGenerator {
        ArrivalTimeGenerator::with_source(
            Duration::from_millis(1000),
            0.1,
            Box::new(ScriptedUniform::new(values).unwrap()),
        )
        .unwrap()
    }

    fn assert_close(actual: Duration, expected_ms: f64) {
        let actual_ms = actual.as_secs_f64() * 1000.0;
        assert!(
            (actual_ms - expected_ms).abs() < 1e-3,
            "expected {expected_ms} ms, got {actual_ms} ms"
        );
    }

    #[test]
    fn test_aperiodic_known_samples() {
        let mut gen = scripted(vec![0.0, 0.5, 0.9, 0.999]);

        assert_eq!(gen.next_aperiodic_wait(), Duration::ZERO);
        assert_close(gen.next_aperiodic_wait(), 6.931_471_8);
        assert_close(gen.next_aperiodic_wait(), 23.025_850_9);
        assert_close(gen.next_aperiodic_wait(), 69.077_552_8);
    }

    #[test]
    fn test_aperiodic_boundary_samples() {
        let mut gen = scripted(vec![1.0 - 1e-12, 1.0, f64::NAN, -0.5]);

        for _ in 0..4 {
            let wait = gen.next_aperiodic_wait();
            assert!(wait < Duration::from_secs(3600), "wait {wait:?} not finite-ish");
        }
    }

    #[test]
    fn test_periodic_is_constant() {
        let mut gen = ArrivalTimeGenerator::new(Duration::from_millis(250), 0.1).unwrap();
        let waits: Vec<_> = (0..100).map(|_| gen.next(TrafficClass::Periodic)).collect();
        assert!(waits.iter().all(|w| *w == Duration::from_millis(250)));
    }

    #[test]
    fn test_periodic_does_not_consume_randomness() {
        let mut gen = scripted(vec![0.5, 0.9]);
        gen.next(TrafficClass::Periodic);
        gen.next(TrafficClass::Periodic);
        assert_close(gen.next(TrafficClass::Aperiodic), 6.931_471_8);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(ArrivalTimeGenerator::new(Duration::from_millis(10), 0.0).is_err());
        assert!(ArrivalTimeGenerator::new(Duration::from_millis(10), -0.1).is_err());
        assert!(ArrivalTimeGenerator::new(Duration::from_millis(10), f64::NAN).is_err());
        assert!(ArrivalTimeGenerator::new(Duration::ZERO, 0.1).is_err());
    }

    #[test]
    fn test_seeded_generators_agree() {
        let config = WorkloadConfig::default();
        let mut a = ArrivalTimeGenerator::from_config(&config, Some(7)).unwrap();
        let mut b = ArrivalTimeGenerator::from_config(&config, Some(7)).unwrap();
        for _ in 0..50 {
            assert_eq!(a.next_aperiodic_wait(), b.next_aperiodic_wait());
        }
    }

    #[test]
    fn test_aperiodic_mean_matches_lambda() {
        let mut gen =
            ArrivalTimeGenerator::with_seed(Duration::from_millis(1000), 0.1, Some(42)).unwrap();
        let n = 20_000;
        let total: f64 = (0..n).map(|_| gen.next_aperiodic_wait().as_secs_f64() * 1000.0).sum();
        let mean = total / n as f64;
        assert!((mean - 10.0).abs() < 0.5, "mean {mean} ms too far from 10 ms");
    }
}
