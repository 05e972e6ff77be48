//! Cross-implementation numerical comparison
//!
//! Every implementation integrates the same ensemble and writes its final
//! states. Two implementations agree when, element by element,
//!
//! ```text
//! |a - b| <= atol + rtol * max(|a|, |b|)
//! ```
//!
//! The rule is symmetric in `a` and `b`, and so is the relative difference
//! `|a - b| / max(|a|, |b|, epsilon)`, which makes `compare(A, B)` and
//! `compare(B, A)` report identical statistics.
//!
//! Pairs are independent: each one is computed only from its two immutable
//! matrices, so pair order affects report order and nothing else.

mod stats;

pub use stats::DiffStats;

use crate::config::BenchConfig;
use crate::matrix::StateMatrix;
use crate::topk::{top_k_indices, SortOrder};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// Default relative tolerance
pub const DEFAULT_RTOL: f64 = 1e-5;

/// Default absolute tolerance
pub const DEFAULT_ATOL: f64 = 1e-8;

/// Default number of worst mismatches reported per pair
pub const DEFAULT_TOP_K: usize = 5;

/// Floor of the relative-difference denominator
pub const REL_EPSILON: f64 = 1e-12;

/// Combined absolute/relative tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Relative tolerance
    pub rtol: f64,
    /// Absolute tolerance
    pub atol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            rtol: DEFAULT_RTOL,
            atol: DEFAULT_ATOL,
        }
    }
}

impl Tolerance {
    /// Create a tolerance.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if either bound is negative or not finite.
    pub fn new(rtol: f64, atol: f64) -> Result<Self> {
        for (name, value) in [("rtol", rtol), ("atol", atol)] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "{name} must be a non-negative finite number, got {value}"
                )));
            }
        }
        Ok(Self { rtol, atol })
    }

    /// Whether `a` and `b` agree. NaN never agrees with anything.
    #[must_use]
    pub fn allows(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.rtol.mul_add(a.abs().max(b.abs()), self.atol)
    }
}

/// Settings for one comparator run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareOptions {
    /// Agreement rule
    pub tolerance: Tolerance,
    /// Number of worst mismatches to keep per pair (0 keeps none)
    pub top_k: usize,
    /// Floor of the relative-difference denominator
    pub epsilon: f64,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::default(),
            top_k: DEFAULT_TOP_K,
            epsilon: REL_EPSILON,
        }
    }
}

/// One element of a pair, ranked by absolute difference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Trajectory index
    pub row: usize,
    /// State index
    pub col: usize,
    /// Value in the left implementation
    pub left: f64,
    /// Value in the right implementation
    pub right: f64,
    /// `|left - right|`
    pub abs_diff: f64,
    /// `|left - right| / max(|left|, |right|, epsilon)`
    pub rel_diff: f64,
    /// Whether this element satisfies the tolerance
    pub within_tolerance: bool,
}

/// Full comparison of one pair of state matrices.
#[derive(Debug, Clone)]
pub struct ComparisonResult {
    left: String,
    right: String,
    tolerance: Tolerance,
    abs_diff: StateMatrix,
    rel_diff: StateMatrix,
    abs_stats: DiffStats,
    rel_stats: DiffStats,
    abs_per_column: Vec<DiffStats>,
    rel_per_column: Vec<DiffStats>,
    worst: Vec<Mismatch>,
    num_close: usize,
}

impl ComparisonResult {
    /// Left implementation name.
    #[must_use]
    pub fn left(&self) -> &str {
        &self.left
    }

    /// Right implementation name.
    #[must_use]
    pub fn right(&self) -> &str {
        &self.right
    }

    /// Tolerance the verdict was computed with.
    #[must_use]
    pub const fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// `(rows, cols)` of both inputs.
    #[must_use]
    pub const fn shape(&self) -> (usize, usize) {
        self.abs_diff.shape()
    }

    /// Element-wise absolute differences.
    #[must_use]
    pub const fn abs_diff(&self) -> &StateMatrix {
        &self.abs_diff
    }

    /// Element-wise relative differences.
    #[must_use]
    pub const fn rel_diff(&self) -> &StateMatrix {
        &self.rel_diff
    }

    /// Statistics of all absolute differences.
    #[must_use]
    pub const fn abs_stats(&self) -> &DiffStats {
        &self.abs_stats
    }

    /// Statistics of all relative differences.
    #[must_use]
    pub const fn rel_stats(&self) -> &DiffStats {
        &self.rel_stats
    }

    /// Absolute-difference statistics per state dimension.
    #[must_use]
    pub fn abs_per_column(&self) -> &[DiffStats] {
        &self.abs_per_column
    }

    /// Relative-difference statistics per state dimension.
    #[must_use]
    pub fn rel_per_column(&self) -> &[DiffStats] {
        &self.rel_per_column
    }

    /// Worst elements by absolute difference, worst first.
    #[must_use]
    pub fn worst(&self) -> &[Mismatch] {
        &self.worst
    }

    /// Number of elements satisfying the tolerance.
    #[must_use]
    pub const fn num_close(&self) -> usize {
        self.num_close
    }

    /// Total number of elements compared.
    #[must_use]
    pub fn total_elements(&self) -> usize {
        self.abs_diff.as_slice().len()
    }

    /// Percentage of elements satisfying the tolerance (100 for empty input).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent_close(&self) -> f64 {
        match self.total_elements() {
            0 => 100.0,
            total => 100.0 * self.num_close as f64 / total as f64,
        }
    }

    /// Verdict: every element satisfies the tolerance.
    #[must_use]
    pub fn within_tolerance(&self) -> bool {
        self.num_close == self.total_elements()
    }
}

/// Compare two state matrices.
///
/// # Errors
///
/// Returns `ShapeMismatch` if the matrices differ in rows or columns.
///
/// # Examples
///
/// ```rust
/// use ode_bench::compare::{compare, CompareOptions};
/// use ode_bench::matrix::StateMatrix;
///
/// let a = StateMatrix::from_rows(&[vec![1.0, 2.0, 3.0]])?;
/// let b = StateMatrix::from_rows(&[vec![1.0, 2.0, 3.0001]])?;
/// let result = compare("jax", &a, "pytorch", &b, &CompareOptions::default())?;
/// assert!(!result.within_tolerance());
/// assert_eq!((result.worst()[0].row, result.worst()[0].col), (0, 2));
/// # Ok::<(), ode_bench::Error>(())
/// ```
pub fn compare(
    left_name: &str,
    left: &StateMatrix,
    right_name: &str,
    right: &StateMatrix,
    options: &CompareOptions,
) -> Result<ComparisonResult> {
    if left.shape() != right.shape() {
        return Err(Error::ShapeMismatch {
            left: left_name.to_string(),
            right: right_name.to_string(),
            left_shape: left.shape(),
            right_shape: right.shape(),
        });
    }

    let (rows, cols) = left.shape();
    let tolerance = options.tolerance;
    let epsilon = options.epsilon;

    let mut abs = Vec::with_capacity(rows * cols);
    let mut rel = Vec::with_capacity(rows * cols);
    let mut num_close = 0;
    for (&a, &b) in left.as_slice().iter().zip(right.as_slice()) {
        let d = (a - b).abs();
        abs.push(d);
        rel.push(d / a.abs().max(b.abs()).max(epsilon));
        if tolerance.allows(a, b) {
            num_close += 1;
        }
    }

    let column = |values: &[f64], j: usize| {
        DiffStats::from_values(values.iter().skip(j).step_by(cols.max(1)).copied())
    };
    let abs_per_column = (0..cols).map(|j| column(&abs, j)).collect();
    let rel_per_column = (0..cols).map(|j| column(&rel, j)).collect();
    let abs_stats = DiffStats::from_values(abs.iter().copied());
    let rel_stats = DiffStats::from_values(rel.iter().copied());

    let worst = if options.top_k == 0 {
        Vec::new()
    } else {
        top_k_indices(&abs, options.top_k, SortOrder::Descending)?
            .into_iter()
            .map(|idx| {
                let (a, b) = (left.as_slice()[idx], right.as_slice()[idx]);
                Mismatch {
                    row: idx / cols,
                    col: idx % cols,
                    left: a,
                    right: b,
                    abs_diff: abs[idx],
                    rel_diff: rel[idx],
                    within_tolerance: tolerance.allows(a, b),
                }
            })
            .collect()
    };

    Ok(ComparisonResult {
        left: left_name.to_string(),
        right: right_name.to_string(),
        tolerance,
        abs_diff: StateMatrix::new(rows, cols, abs)?,
        rel_diff: StateMatrix::new(rows, cols, rel)?,
        abs_stats,
        rel_stats,
        abs_per_column,
        rel_per_column,
        worst,
        num_close,
    })
}

/// Outcome of one pair inside a comparison suite.
#[derive(Debug)]
pub enum PairOutcome {
    /// Matrices were compared
    Compared(Box<ComparisonResult>),
    /// Matrices could not be compared (shape mismatch)
    Incompatible {
        /// Left implementation name
        left: String,
        /// Right implementation name
        right: String,
        /// Why the pair was excluded
        error: Error,
    },
}

/// Overall verdict of a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every compared pair is within tolerance and nothing was excluded
    Pass,
    /// At least one compared pair is outside tolerance
    ToleranceFailure,
    /// No pair failed tolerance, but some pair was incompatible or fewer
    /// than two implementations were available
    Incomplete,
}

/// An implementation that could not be loaded.
#[derive(Debug)]
pub struct Unavailable {
    /// Artifact name
    pub implementation: String,
    /// Load error (`MissingArtifact` or `Parse`)
    pub error: Error,
}

/// All pairwise comparisons of one comparator run.
#[derive(Debug)]
pub struct ComparisonSuite {
    implementations: Vec<(String, (usize, usize))>,
    unavailable: Vec<Unavailable>,
    outcomes: Vec<PairOutcome>,
}

impl ComparisonSuite {
    /// Compare every unordered pair of `matrices`.
    ///
    /// Pairs are formed over the names in sorted order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if two matrices share a name.
    pub fn run(
        mut matrices: Vec<(String, StateMatrix)>,
        unavailable: Vec<Unavailable>,
        options: &CompareOptions,
    ) -> Result<Self> {
        matrices.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(w) = matrices.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(Error::InvalidInput(format!(
                "implementation {} listed twice",
                w[0].0
            )));
        }

        let mut outcomes = Vec::new();
        for (i, (left_name, left)) in matrices.iter().enumerate() {
            for (right_name, right) in &matrices[i + 1..] {
                let outcome = match compare(left_name, left, right_name, right, options) {
                    Ok(result) => {
                        info!(
                            left = %left_name,
                            right = %right_name,
                            within_tolerance = result.within_tolerance(),
                            max_abs = result.abs_stats().max,
                            "compared pair"
                        );
                        PairOutcome::Compared(Box::new(result))
                    }
                    Err(error @ Error::ShapeMismatch { .. }) => {
                        warn!(left = %left_name, right = %right_name, error = %error, "pair excluded");
                        PairOutcome::Incompatible {
                            left: left_name.clone(),
                            right: right_name.clone(),
                            error,
                        }
                    }
                    Err(e) => return Err(e),
                };
                outcomes.push(outcome);
            }
        }

        Ok(Self {
            implementations: matrices
                .iter()
                .map(|(name, m)| (name.clone(), m.shape()))
                .collect(),
            unavailable,
            outcomes,
        })
    }

    /// Names and shapes of the implementations that took part, sorted by name.
    #[must_use]
    pub fn implementations(&self) -> &[(String, (usize, usize))] {
        &self.implementations
    }

    /// Implementations that were skipped.
    #[must_use]
    pub fn unavailable(&self) -> &[Unavailable] {
        &self.unavailable
    }

    /// Every pair outcome, in pair order.
    #[must_use]
    pub fn outcomes(&self) -> &[PairOutcome] {
        &self.outcomes
    }

    /// Successfully compared pairs.
    pub fn compared(&self) -> impl Iterator<Item = &ComparisonResult> {
        self.outcomes.iter().filter_map(|o| match o {
            PairOutcome::Compared(result) => Some(result.as_ref()),
            PairOutcome::Incompatible { .. } => None,
        })
    }

    /// Look up the comparison of two implementations in either order.
    #[must_use]
    pub fn pair(&self, a: &str, b: &str) -> Option<&PairOutcome> {
        self.outcomes.iter().find(|o| {
            let (l, r) = match o {
                PairOutcome::Compared(result) => (result.left(), result.right()),
                PairOutcome::Incompatible { left, right, .. } => (left.as_str(), right.as_str()),
            };
            (l == a && r == b) || (l == b && r == a)
        })
    }

    /// Number of compared pairs within tolerance.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.compared().filter(|r| r.within_tolerance()).count()
    }

    /// Number of compared pairs outside tolerance.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.compared().filter(|r| !r.within_tolerance()).count()
    }

    /// Number of pairs excluded for incompatible shapes.
    #[must_use]
    pub fn incompatible(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, PairOutcome::Incompatible { .. }))
            .count()
    }

    /// Overall verdict.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        if self.failed() > 0 {
            Verdict::ToleranceFailure
        } else if self.incompatible() > 0 || self.implementations.len() < 2 {
            Verdict::Incomplete
        } else {
            Verdict::Pass
        }
    }
}

/// Loads every configured state artifact and compares them.
#[derive(Debug, Clone, Copy)]
pub struct Comparator<'a> {
    config: &'a BenchConfig,
    options: CompareOptions,
}

impl<'a> Comparator<'a> {
    /// Create a comparator.
    #[must_use]
    pub const fn new(config: &'a BenchConfig, options: CompareOptions) -> Self {
        Self { config, options }
    }

    /// Load the artifacts of `names`. Absent or unreadable artifacts are
    /// reported as unavailable instead of failing the run.
    #[must_use]
    pub fn load(&self, names: &[String]) -> (Vec<(String, StateMatrix)>, Vec<Unavailable>) {
        let expected_dim = self.config.model().dimension();
        let mut loaded = Vec::new();
        let mut unavailable = Vec::new();

        for name in names {
            let path: PathBuf = self.config.artifact_path(name);
            match StateMatrix::load(&path, name) {
                Ok(matrix) => {
                    info!(implementation = %name, rows = matrix.rows(), cols = matrix.cols(), "loaded state artifact");
                    if matrix.cols() != expected_dim {
                        warn!(
                            implementation = %name,
                            cols = matrix.cols(),
                            expected = expected_dim,
                            model = %self.config.model(),
                            "state dimension differs from configured model"
                        );
                    }
                    loaded.push((name.clone(), matrix));
                }
                Err(error) => {
                    warn!(implementation = %name, error = %error, "implementation unavailable for comparison");
                    unavailable.push(Unavailable {
                        implementation: name.clone(),
                        error,
                    });
                }
            }
        }

        (loaded, unavailable)
    }

    /// Load the configured artifacts and compare all pairs.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the configuration lists an artifact twice.
    pub fn run(&self) -> Result<ComparisonSuite> {
        let (loaded, unavailable) = self.load(&self.config.artifact_names());
        ComparisonSuite::run(loaded, unavailable, &self.options)
    }
}
