//! Seed derivation for reproducible arrival sequences
//!
//! A single master seed (the profile's `experiment.seed`) is expanded into
//! independent per-component seeds with SHA-256, so adding a new random
//! component never shifts the sequence an existing one sees.
//!
//! ```
//! use cadence_core::seed::{components, derive_seed};
//!
//! let arrivals = derive_seed(42, components::APERIODIC_ARRIVALS);
//! assert_eq!(arrivals, derive_seed(42, components::APERIODIC_ARRIVALS));
//! assert_ne!(arrivals, derive_seed(43, components::APERIODIC_ARRIVALS));
//! ```

use sha2::{Digest, Sha256};

/// Derive a component-specific seed from a master seed using SHA-256
///
/// Hashes the big-endian master seed followed by the component name and takes
/// the first 8 bytes of the digest as a big-endian `u64`.
pub fn derive_seed(master_seed: u64, component: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(master_seed.to_be_bytes());
    hasher.update(component.as_bytes());
    let result = hasher.finalize();

    u64::from_be_bytes([
        result[0], result[1], result[2], result[3], result[4], result[5], result[6], result[7],
    ])
}

/// Standard component names for seed derivation
pub mod components {
    pub const APERIODIC_ARRIVALS: &str = "aperiodic_arrivals";
}
