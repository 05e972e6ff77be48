//! # ode-bench: GPU ODE Ensemble Benchmark Driver
//!
//! Drives independently implemented ODE ensemble solvers (CUBIE,
//! JAX/Diffrax, PyTorch/torchdiffeq, ...) across a geometric sweep of
//! trajectory counts, records their best-of-N timings, and checks that all
//! implementations land on the same final states.
//!
//! ## Data flow
//!
//! ```text
//! SolverRunner ──> SweepDriver ──> <data_dir>/<IMPL>/<Prefix>_times_<mode>.txt
//!      │
//!      └── at the reference count ──> <numerical_dir>/<artifact>.csv
//!                                            │
//!                                    Comparator (all pairs)
//!                                            │
//!                                 text report / markdown / JSON
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use ode_bench::compare::{compare, CompareOptions};
//! use ode_bench::matrix::StateMatrix;
//!
//! let a = StateMatrix::from_rows(&[vec![1.0, 2.0, 3.0]])?;
//! let b = StateMatrix::from_rows(&[vec![1.00001, 2.00002, 3.00009]])?;
//! let result = compare("jax", &a, "cubie", &b, &CompareOptions::default())?;
//! assert!(!result.within_tolerance());
//! # Ok::<(), ode_bench::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod compare;
pub mod config;
pub mod error;
pub mod matrix;
pub mod model;
pub mod report;
pub mod runner;
pub mod sweep;
pub mod timing;
pub mod topk;

pub use error::{Error, Result};

/// Install the stderr `tracing` subscriber used by the binaries.
///
/// The filter defaults to `info` and honours `RUST_LOG`. Calling this more
/// than once is harmless.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
