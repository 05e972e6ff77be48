//! Error types for ode-bench
//!
//! Every variant names the implementation, pair, or file it concerns so a
//! failure never surfaces without context.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// ode-bench error types
#[derive(Error, Debug)]
pub enum Error {
    /// External runner failed or produced unparseable timing output
    #[error("Runner invocation failed for {implementation} at {trajectories} trajectories: {reason}")]
    RunnerInvocation {
        /// Implementation name
        implementation: String,
        /// Trajectory count of the failed iteration
        trajectories: u64,
        /// What went wrong
        reason: String,
    },

    /// Paired state matrices have incompatible dimensions
    #[error("Shape mismatch: {left} is {}x{}, {right} is {}x{}", left_shape.0, left_shape.1, right_shape.0, right_shape.1)]
    ShapeMismatch {
        /// Left implementation name
        left: String,
        /// Right implementation name
        right: String,
        /// (rows, columns) of the left matrix
        left_shape: (usize, usize),
        /// (rows, columns) of the right matrix
        right_shape: (usize, usize),
    },

    /// Expected timing or state artifact is absent
    #[error("Missing artifact for {implementation}: {}", path.display())]
    MissingArtifact {
        /// Implementation name
        implementation: String,
        /// Path that was expected to exist
        path: PathBuf,
    },

    /// Malformed line in a timing log or state artifact
    #[error("Parse error in {}:{line}: {reason}", path.display())]
    Parse {
        /// File being read
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// What was wrong with the line
        reason: String,
    },

    /// Timing log on disk no longer holds what the driver appended
    #[error("Timing log {} was modified outside the driver: expected {expected} samples, found {found}", path.display())]
    LogDiverged {
        /// Log file
        path: PathBuf,
        /// Samples appended through the driver's handle
        expected: usize,
        /// Samples found on disk
        found: usize,
    },

    /// Configuration could not be read or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument passed to a library call
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
