//! # cmm-tests
//!
//! Integration testing support for iccmm.
//!
//! This crate provides:
//! - [`ProfileBuilder`] for synthetic profiles of every class the engine
//!   transforms
//! - Seeded sample patterns, including non-finite and out-of-range values
//! - A seeded byte mutator and an [`exercise`] harness that drives a
//!   damaged profile through attach, validation, tag lookup and a chain
//!
//! ## Test Categories
//!
//! 1. **Container**: write/attach round trips, minimal profiles
//! 2. **Validation**: overlap, duplicates, bounds, colorant names
//! 3. **Transforms**: identity tables, chain compatibility, calculator faults
//! 4. **Robustness**: mutated profiles, hostile sample values, threads
//! 5. **Textual**: JSON round trips

pub mod builder;
pub mod mutate;
pub mod patterns;

pub use builder::ProfileBuilder;
pub use mutate::{Exercise, Mutator, exercise};
pub use patterns::{SamplePattern, generate_samples, hostile_samples, hostile_values};

use tracing_subscriber::EnvFilter;

/// Route iccmm's tracing output to the test writer, filtered by `RUST_LOG`
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
