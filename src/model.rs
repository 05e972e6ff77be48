//! ODE model catalogue
//!
//! The benchmark runners integrate one of a small set of reference systems,
//! each with a single scalar parameter swept linearly across the ensemble.
//! The driver forwards the model name to runners; the comparator uses the
//! state dimension to sanity-check loaded matrices.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reference ODE systems known to the benchmark suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    /// Lorenz system, `rho` varied over `[0, 21]`
    #[default]
    Lorenz,
    /// Van der Pol oscillator, `mu` varied over `[0.1, 5]`
    VanDerPol,
}

impl Model {
    /// Name passed to runners on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Lorenz => "lorenz",
            Self::VanDerPol => "vanderpol",
        }
    }

    /// Number of state variables (matrix columns).
    #[must_use]
    pub const fn dimension(self) -> usize {
        match self {
            Self::Lorenz => 3,
            Self::VanDerPol => 2,
        }
    }

    /// Name of the varied scalar parameter.
    #[must_use]
    pub const fn parameter_name(self) -> &'static str {
        match self {
            Self::Lorenz => "rho",
            Self::VanDerPol => "mu",
        }
    }

    /// Closed range the parameter is spaced over.
    #[must_use]
    pub const fn parameter_range(self) -> (f64, f64) {
        match self {
            Self::Lorenz => (0.0, 21.0),
            Self::VanDerPol => (0.1, 5.0),
        }
    }

    /// Integration interval.
    #[must_use]
    pub const fn tspan(self) -> (f64, f64) {
        match self {
            Self::Lorenz => (0.0, 1.0),
            Self::VanDerPol => (0.0, 2.0 * std::f64::consts::PI),
        }
    }

    /// Fixed initial condition shared by every trajectory.
    #[must_use]
    pub const fn initial_state(self) -> &'static [f64] {
        match self {
            Self::Lorenz => &[1.0, 0.0, 0.0],
            Self::VanDerPol => &[2.0, 0.0],
        }
    }

    /// Parameter values for an ensemble of `n` trajectories, linearly spaced
    /// over [`parameter_range`](Self::parameter_range) inclusive of both ends.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn parameter_list(self, n: usize) -> Vec<f64> {
        let (lo, hi) = self.parameter_range();
        match n {
            0 => Vec::new(),
            1 => vec![lo],
            _ => {
                let step = (hi - lo) / (n - 1) as f64;
                (0..n)
                    .map(|i| if i == n - 1 { hi } else { (i as f64).mul_add(step, lo) })
                    .collect()
            }
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Model {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lorenz" => Ok(Self::Lorenz),
            "vanderpol" | "van_der_pol" => Ok(Self::VanDerPol),
            other => Err(Error::InvalidInput(format!(
                "Unknown model: {other}. Available models: lorenz, vanderpol"
            ))),
        }
    }
}
