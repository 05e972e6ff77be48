//! Summary statistics over difference values

use serde::{Deserialize, Serialize};

/// Max / mean / min / standard deviation of a set of differences.
///
/// Computed over finite values only; the number of values that were not
/// finite is kept separately. The standard deviation is the population one
/// (divides by `n`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffStats {
    /// Largest value
    pub max: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// Smallest value
    pub min: f64,
    /// Population standard deviation
    pub std: f64,
    /// Number of finite values summarised
    pub count: usize,
    /// Number of NaN or infinite values skipped
    pub non_finite: usize,
}

impl DiffStats {
    /// Summarise a sequence of values. The iterator is walked twice.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_values<I>(values: I) -> Self
    where
        I: Iterator<Item = f64> + Clone,
    {
        let mut stats = Self {
            max: f64::NEG_INFINITY,
            min: f64::INFINITY,
            ..Self::default()
        };
        let mut sum = 0.0;
        for v in values.clone() {
            if v.is_finite() {
                stats.max = stats.max.max(v);
                stats.min = stats.min.min(v);
                sum += v;
                stats.count += 1;
            } else {
                stats.non_finite += 1;
            }
        }

        if stats.count == 0 {
            return Self {
                non_finite: stats.non_finite,
                ..Self::default()
            };
        }

        let n = stats.count as f64;
        stats.mean = sum / n;
        let sq: f64 = values
            .filter(|v| v.is_finite())
            .map(|v| (v - stats.mean) * (v - stats.mean))
            .sum();
        stats.std = (sq / n).sqrt();
        stats
    }
}
