//! Statistical distributions for workload generation
//!
//! Provides the samplers behind the arrival-time generator:
//! - Inter-arrival timing for aperiodic traffic (Exponential, for a Poisson process)
//! - Constant spacing for periodic traffic (FixedInterval)
//!
//! Exponential samples are drawn by inverse-transform sampling over an explicit
//! uniform source, so the transform can be checked against known inputs and the
//! `u -> 1` boundary is handled in one place.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Largest `f64` strictly below 1.0.
///
/// Uniform samples are clamped to this value before `ln(1 - u)` is taken.
pub const MAX_UNIFORM: f64 = 1.0 - f64::EPSILON / 2.0;

/// Trait for all distributions
pub trait Distribution: Send {
    /// Sample a value from this distribution
    fn sample(&mut self) -> f64;
}

/// Source of uniformly distributed values in `[0, 1)`.
///
/// Cryptographic strength is not required; the source only needs enough
/// period for a long-running Poisson arrival simulation.
pub trait UniformSource: Send {
    /// Next value, nominally in `[0, 1)`.
    ///
    /// Implementations backed by integer generators may emit exactly `1.0`
    /// after normalization. Callers must not rely on the upper bound.
    fn next_uniform(&mut self) -> f64;
}

/// Uniform source backed by a `SmallRng`
pub struct SmallRngUniform {
    rng: SmallRng,
}

impl SmallRngUniform {
    /// Create a source with an optional explicit seed (None = use entropy)
    pub fn with_seed(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => SmallRng::seed_from_u64(s),
            None => SmallRng::from_os_rng(),
        };
        Self { rng }
    }
}

impl UniformSource for SmallRngUniform {
    fn next_uniform(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}

/// Uniform source replaying a fixed sequence of values, cycling at the end.
///
/// Used to drive the exponential transform with known inputs.
#[derive(Debug, Clone)]
pub struct ScriptedUniform {
    values: Vec<f64>,
    next: usize,
}

impl ScriptedUniform {
    /// Create a scripted source
    ///
    /// # Returns
    /// Error if `values` is empty
    pub fn new(values: Vec<f64>) -> anyhow::Result<Self> {
        if values.is_empty() {
            anyhow::bail!("Scripted uniform source needs at least one value");
        }
        Ok(Self { values, next: 0 })
    }
}

impl UniformSource for ScriptedUniform {
    fn next_uniform(&mut self) -> f64 {
        let value = self.values[self.next];
        self.next = (self.next + 1) % self.values.len();
        value
    }
}

/// Clamp a raw uniform sample into `[0, MAX_UNIFORM]`.
///
/// NaN and negative inputs map to 0.0 (a zero-length gap); values at or above
/// 1.0 map to `MAX_UNIFORM`, which keeps `ln(1 - u)` finite.
#[inline]
pub fn clamp_uniform(u: f64) -> f64 {
    if u.is_nan() || u < 0.0 {
        0.0
    } else {
        u.min(MAX_UNIFORM)
    }
}

/// Inverse-transform sample of an exponential distribution: `-ln(1 - u) / lambda`.
///
/// The result is in the reciprocal unit of `lambda` and is always finite and
/// non-negative for `lambda > 0`.
#[inline]
pub fn exponential_inverse_transform(u: f64, lambda: f64) -> f64 {
    let u = clamp_uniform(u);
    // ln_1p(-u) == ln(1 - u), accurate for small u
    let wait = -(-u).ln_1p() / lambda;
    // -0.0 for u == 0
    wait.max(0.0)
}

/// Exponential distribution (Poisson inter-arrival times)
///
/// Used for aperiodic request inter-arrival times (bursty, memoryless traffic).
/// Every draw consumes one fresh uniform sample, so successive gaps are
/// independent of each other.
pub struct ExponentialDistribution {
    /// Rate parameter (arrivals per unit time)
    lambda: f64,
    /// Uniform input to the inverse transform
    source: Box<dyn UniformSource>,
}

impl ExponentialDistribution {
    /// Create a new Exponential distribution with entropy-based seed
    ///
    /// # Returns
    /// Error if lambda is not a finite value > 0
    pub fn new(lambda: f64) -> anyhow::Result<Self> {
        Self::with_seed(lambda, None)
    }

    /// Create a new Exponential distribution with explicit seed
    ///
    /// # Parameters
    /// - `lambda`: Rate parameter (arrivals per unit time)
    /// - `seed`: Optional seed for reproducibility (None = use entropy)
    pub fn with_seed(lambda: f64, seed: Option<u64>) -> anyhow::Result<Self> {
        Self::with_source(lambda, Box::new(SmallRngUniform::with_seed(seed)))
    }

    /// Create a new Exponential distribution over an arbitrary uniform source
    pub fn with_source(lambda: f64, source: Box<dyn UniformSource>) -> anyhow::Result<Self> {
        if !lambda.is_finite() || lambda <= 0.0 {
            anyhow::bail!("Exponential lambda must be a finite value > 0, got {lambda}");
        }
        Ok(Self { lambda, source })
    }

    /// Sample one inter-arrival time, in the reciprocal unit of lambda
    pub fn sample_inter_arrival(&mut self) -> f64 {
        let u = self.source.next_uniform();
        exponential_inverse_transform(u, self.lambda)
    }
}

impl Distribution for ExponentialDistribution {
    fn sample(&mut self) -> f64 {
        self.sample_inter_arrival()
    }
}

/// Degenerate distribution that always returns the same value
#[derive(Debug, Clone, Copy)]
pub struct FixedIntervalDistribution {
    value: f64,
}

impl FixedIntervalDistribution {
    /// # Returns
    /// Error if value is negative or not finite
    pub fn new(value: f64) -> anyhow::Result<Self> {
        if !value.is_finite() || value < 0.0 {
            anyhow::bail!("Fixed interval must be a finite value >= 0, got {value}");
        }
        Ok(Self { value })
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl Distribution for FixedIntervalDistribution {
    fn sample(&mut self) -> f64 {
        self.value
    }
}
