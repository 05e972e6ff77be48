//! Human- and machine-readable comparison reports
//!
//! Reports are derived output: they are rebuilt from the state artifacts on
//! every comparator run and never read back.

use crate::compare::{ComparisonResult, ComparisonSuite, DiffStats, Mismatch, PairOutcome, Tolerance, Verdict};
use crate::model::Model;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Default file name of the JSON summary written by `compare-results`
pub const DEFAULT_SUMMARY_FILE: &str = "comparison_summary.json";

const RULE: &str = "================================================================================";

/// Plain-text report of every pair plus a summary, for stdout.
#[derive(Debug, Clone, Copy)]
pub struct TextReport<'a> {
    suite: &'a ComparisonSuite,
    tolerance: Tolerance,
    model: Option<Model>,
}

impl<'a> TextReport<'a> {
    /// Create a report over `suite`.
    #[must_use]
    pub const fn new(suite: &'a ComparisonSuite, tolerance: Tolerance) -> Self {
        Self {
            suite,
            tolerance,
            model: None,
        }
    }

    /// Label each worst mismatch with the parameter value of its trajectory.
    ///
    /// Row `i` of an `n`-row ensemble is the trajectory run with
    /// `model.parameter_list(n)[i]`.
    #[must_use]
    pub const fn with_model(mut self, model: Model) -> Self {
        self.model = Some(model);
        self
    }
}

fn write_stats(f: &mut fmt::Formatter<'_>, title: &str, stats: &DiffStats) -> fmt::Result {
    writeln!(f, "\n{title}:")?;
    writeln!(f, "  Max:  {:.6e}", stats.max)?;
    writeln!(f, "  Mean: {:.6e}", stats.mean)?;
    writeln!(f, "  Min:  {:.6e}", stats.min)?;
    writeln!(f, "  Std:  {:.6e}", stats.std)?;
    if stats.non_finite > 0 {
        writeln!(f, "  Non-finite: {}", stats.non_finite)?;
    }
    Ok(())
}

fn write_pair(
    f: &mut fmt::Formatter<'_>,
    result: &ComparisonResult,
    model: Option<Model>,
) -> fmt::Result {
    let tol = result.tolerance();
    let (rows, cols) = result.shape();
    writeln!(f, "Array shape: ({rows}, {cols})")?;
    writeln!(
        f,
        "\nallclose(rtol={}, atol={}): {}",
        tol.rtol,
        tol.atol,
        if result.within_tolerance() { "PASS" } else { "FAIL" }
    )?;
    writeln!(
        f,
        "Elements within tolerance: {}/{} ({:.2}%)",
        result.num_close(),
        result.total_elements(),
        result.percent_close()
    )?;

    write_stats(f, "Absolute differences", result.abs_stats())?;
    write_stats(f, "Relative differences", result.rel_stats())?;

    writeln!(f, "\nPer-state statistics (over all trajectories):")?;
    for (j, (abs, rel)) in result
        .abs_per_column()
        .iter()
        .zip(result.rel_per_column())
        .enumerate()
    {
        writeln!(
            f,
            "  State {j}: abs max={:.6e} mean={:.6e} min={:.6e} std={:.6e} | rel max={:.6e} mean={:.6e}",
            abs.max, abs.mean, abs.min, abs.std, rel.max, rel.mean
        )?;
    }

    if !result.worst().is_empty() {
        let parameters = model.map(|m| (m.parameter_name(), m.parameter_list(rows)));
        writeln!(f, "\nWorst mismatches (top {}):", result.worst().len())?;
        for m in result.worst() {
            let trajectory = parameters
                .as_ref()
                .and_then(|(name, values)| values.get(m.row).map(|v| format!(" ({name}={v:.6})")))
                .unwrap_or_default();
            writeln!(
                f,
                "  [{}, {}]{}: {}={:.6e}, {}={:.6e}, abs={:.6e}, rel={:.6e}{}",
                m.row,
                m.col,
                trajectory,
                result.left(),
                m.left,
                result.right(),
                m.right,
                m.abs_diff,
                m.rel_diff,
                if m.within_tolerance { "" } else { "  (outside tolerance)" }
            )?;
        }
    }
    Ok(())
}

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suite = self.suite;
        writeln!(f, "{RULE}")?;
        writeln!(f, "ODE ensemble numerical comparison")?;
        writeln!(f, "{RULE}")?;
        writeln!(
            f,
            "Tolerance: |a - b| <= atol + rtol * max(|a|, |b|), rtol={}, atol={}\n",
            self.tolerance.rtol, self.tolerance.atol
        )?;

        for (name, (rows, cols)) in suite.implementations() {
            writeln!(f, "✓ Loaded {name} - shape: ({rows}, {cols})")?;
        }
        for skipped in suite.unavailable() {
            writeln!(f, "✗ {} unavailable: {}", skipped.implementation, skipped.error)?;
        }

        for outcome in suite.outcomes() {
            writeln!(f, "\n{RULE}")?;
            match outcome {
                PairOutcome::Compared(result) => {
                    writeln!(f, "Comparing {} vs {}", result.left(), result.right())?;
                    writeln!(f, "{RULE}")?;
                    write_pair(f, result, self.model)?;
                }
                PairOutcome::Incompatible { left, right, error } => {
                    writeln!(f, "Comparing {left} vs {right}")?;
                    writeln!(f, "{RULE}")?;
                    writeln!(f, "ERROR: {error}")?;
                    writeln!(f, "Pair excluded from pass/fail statistics.")?;
                }
            }
        }

        writeln!(f, "\n{RULE}")?;
        writeln!(f, "SUMMARY")?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "Datasets compared: {}", suite.implementations().len())?;
        writeln!(f, "Pairwise comparisons: {}", suite.outcomes().len())?;
        writeln!(f, "  within tolerance:  {}", suite.passed())?;
        writeln!(f, "  outside tolerance: {}", suite.failed())?;
        writeln!(f, "  shape mismatch:    {}", suite.incompatible())?;
        for result in suite.compared().filter(|r| !r.within_tolerance()) {
            writeln!(
                f,
                "  FAIL {} vs {}: max abs diff {:.6e}",
                result.left(),
                result.right(),
                result.abs_stats().max
            )?;
        }
        if suite.implementations().len() < 2 {
            writeln!(
                f,
                "Need at least 2 datasets to compare, found {}.",
                suite.implementations().len()
            )?;
        }
        let verdict = match suite.verdict() {
            Verdict::Pass => "PASS: all implementations agree within tolerance",
            Verdict::ToleranceFailure => "FAIL: some implementations disagree beyond tolerance",
            Verdict::Incomplete => "INCOMPLETE: not every available pair could be verified",
        };
        writeln!(f, "{verdict}")
    }
}

/// Markdown matrix of pairwise results (max / mean abs diff and % close per cell).
#[derive(Debug, Clone, Copy)]
pub struct MarkdownTable<'a> {
    suite: &'a ComparisonSuite,
}

impl<'a> MarkdownTable<'a> {
    /// Create a table over `suite`.
    #[must_use]
    pub const fn new(suite: &'a ComparisonSuite) -> Self {
        Self { suite }
    }

    /// Write the table to `path`.
    ///
    /// # Errors
    ///
    /// Returns IO errors from writing the file.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_string())?;
        Ok(())
    }
}

impl fmt::Display for MarkdownTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .suite
            .implementations()
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();

        writeln!(f, "# Pairwise comparisons\n")?;
        writeln!(f, "## Packages included\n")?;
        writeln!(f, "{}\n", names.join(", "))?;
        writeln!(f, "## Pairwise difference table\n")?;
        writeln!(f, "| |{}|", names.join("|"))?;
        writeln!(f, "|{}", "---|".repeat(names.len() + 1))?;

        for row in &names {
            write!(f, "|{row}")?;
            for col in &names {
                if row == col {
                    write!(f, "|-")?;
                    continue;
                }
                match self.suite.pair(row, col) {
                    Some(PairOutcome::Compared(r)) => write!(
                        f,
                        "|Max: {:.2e}<br>Mean: {:.2e}<br>%Close: {:.1}%",
                        r.abs_stats().max,
                        r.abs_stats().mean,
                        r.percent_close()
                    )?,
                    Some(PairOutcome::Incompatible { .. }) | None => write!(f, "|N/A")?,
                }
            }
            writeln!(f, "|")?;
        }
        Ok(())
    }
}

/// Status of one pair in the JSON summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    /// Within tolerance
    Pass,
    /// Outside tolerance
    Fail,
    /// Excluded, shapes differ
    ShapeMismatch,
}

/// One pair in the JSON summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSummary {
    /// Left implementation
    pub left: String,
    /// Right implementation
    pub right: String,
    /// Pair status
    pub status: PairStatus,
    /// Absolute-difference statistics (absent for excluded pairs)
    pub abs: Option<DiffStats>,
    /// Relative-difference statistics (absent for excluded pairs)
    pub rel: Option<DiffStats>,
    /// Percentage of elements within tolerance
    pub percent_close: Option<f64>,
    /// Worst mismatches
    pub worst: Vec<Mismatch>,
    /// Error message for excluded pairs
    pub error: Option<String>,
}

/// Machine-readable summary of a comparator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSummary {
    /// When the summary was generated
    pub generated_at: DateTime<Utc>,
    /// Tolerance used
    pub tolerance: Tolerance,
    /// Implementations compared
    pub implementations: Vec<String>,
    /// Implementations skipped, with the reason
    pub unavailable: Vec<(String, String)>,
    /// Per-pair results
    pub pairs: Vec<PairSummary>,
    /// Pairs within tolerance
    pub passed: usize,
    /// Pairs outside tolerance
    pub failed: usize,
    /// Pairs excluded for shape mismatch
    pub incompatible: usize,
}

impl SuiteSummary {
    /// Summarise a suite.
    #[must_use]
    pub fn from_suite(suite: &ComparisonSuite, tolerance: Tolerance) -> Self {
        let pairs = suite
            .outcomes()
            .iter()
            .map(|outcome| match outcome {
                PairOutcome::Compared(r) => PairSummary {
                    left: r.left().to_string(),
                    right: r.right().to_string(),
                    status: if r.within_tolerance() {
                        PairStatus::Pass
                    } else {
                        PairStatus::Fail
                    },
                    abs: Some(*r.abs_stats()),
                    rel: Some(*r.rel_stats()),
                    percent_close: Some(r.percent_close()),
                    worst: r.worst().to_vec(),
                    error: None,
                },
                PairOutcome::Incompatible { left, right, error } => PairSummary {
                    left: left.clone(),
                    right: right.clone(),
                    status: PairStatus::ShapeMismatch,
                    abs: None,
                    rel: None,
                    percent_close: None,
                    worst: Vec::new(),
                    error: Some(error.to_string()),
                },
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            tolerance,
            implementations: suite
                .implementations()
                .iter()
                .map(|(name, _)| name.clone())
                .collect(),
            unavailable: suite
                .unavailable()
                .iter()
                .map(|u| (u.implementation.clone(), u.error.to_string()))
                .collect(),
            pairs,
            passed: suite.passed(),
            failed: suite.failed(),
            incompatible: suite.incompatible(),
        }
    }

    /// Write the summary as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns JSON or IO errors.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
