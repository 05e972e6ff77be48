//! Timing series storage
//!
//! **Append-only write pattern**:
//! - One plain-text log per (implementation, stepping mode)
//! - One line per sample: `<trajectory_count> <elapsed_milliseconds>`
//! - A sweep truncates its logs once, at the start, then only appends
//!
//! Each sample is written with a single `write_all` of the complete line and
//! synced before the next sweep step, so an interrupted sweep leaves a valid
//! (shorter) log rather than a torn one.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Integration step-size strategy benchmarked by a runner.
///
/// The labels are benchmark profiles; they do not promise which internal
/// step controller a runner actually configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SteppingMode {
    /// Constant step size
    Fixed,
    /// Error-controlled step size
    Adaptive,
}

impl SteppingMode {
    /// Both modes, in report order.
    pub const ALL: [Self; 2] = [Self::Fixed, Self::Adaptive];

    /// Word used by runners when reporting this mode.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Adaptive => "adaptive",
        }
    }

    /// Suffix of the timing log file name.
    #[must_use]
    pub const fn file_suffix(self) -> &'static str {
        match self {
            Self::Fixed => "unadaptive",
            Self::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for SteppingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SteppingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" | "unadaptive" => Ok(Self::Fixed),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(Error::InvalidInput(format!(
                "Unknown stepping mode: {other} (expected fixed or adaptive)"
            ))),
        }
    }
}

/// One best-of-N timing measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingSample {
    trajectories: u64,
    elapsed_ms: f64,
}

impl TimingSample {
    /// Create a sample.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `trajectories` is zero or `elapsed_ms` is
    /// negative or not finite.
    pub fn new(trajectories: u64, elapsed_ms: f64) -> Result<Self> {
        if trajectories == 0 {
            return Err(Error::InvalidInput(
                "trajectory count must be positive".to_string(),
            ));
        }
        if !elapsed_ms.is_finite() || elapsed_ms < 0.0 {
            return Err(Error::InvalidInput(format!(
                "elapsed time must be a non-negative finite number, got {elapsed_ms}"
            )));
        }
        Ok(Self {
            trajectories,
            elapsed_ms,
        })
    }

    /// Number of trajectories in the benchmarked ensemble.
    #[must_use]
    pub const fn trajectories(&self) -> u64 {
        self.trajectories
    }

    /// Best observed wall-clock time in milliseconds.
    #[must_use]
    pub const fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    /// Parse one log line. Returns `Ok(None)` for blank lines.
    fn parse_line(line: &str) -> std::result::Result<Option<Self>, String> {
        let mut fields = line.split_whitespace();
        let Some(count) = fields.next() else {
            return Ok(None);
        };
        let elapsed = fields
            .next()
            .ok_or_else(|| "missing elapsed time column".to_string())?;
        if fields.next().is_some() {
            return Err("expected exactly two columns".to_string());
        }
        let trajectories = count
            .parse::<u64>()
            .map_err(|e| format!("bad trajectory count {count:?}: {e}"))?;
        let elapsed_ms = elapsed
            .parse::<f64>()
            .map_err(|e| format!("bad elapsed time {elapsed:?}: {e}"))?;
        Self::new(trajectories, elapsed_ms)
            .map(Some)
            .map_err(|e| e.to_string())
    }
}

impl fmt::Display for TimingSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.trajectories, self.elapsed_ms)
    }
}

/// Ordered samples of one sweep run.
///
/// Grows only by [`push`](Self::push), which rejects any trajectory count
/// that does not strictly exceed the previous one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingSeries {
    samples: Vec<TimingSample>,
}

impl TimingSeries {
    /// Create an empty series.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the trajectory count is not strictly
    /// greater than the last recorded one.
    pub fn push(&mut self, sample: TimingSample) -> Result<()> {
        if let Some(last) = self.samples.last() {
            if sample.trajectories() <= last.trajectories() {
                return Err(Error::InvalidInput(format!(
                    "trajectory counts must increase: {} after {}",
                    sample.trajectories(),
                    last.trajectories()
                )));
            }
        }
        self.samples.push(sample);
        Ok(())
    }

    /// All samples, in append order.
    #[must_use]
    pub fn samples(&self) -> &[TimingSample] {
        &self.samples
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no sample has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Trajectory counts, in append order.
    #[must_use]
    pub fn trajectory_counts(&self) -> Vec<u64> {
        self.samples.iter().map(TimingSample::trajectories).collect()
    }
}

/// Append-only timing log backed by a file.
///
/// The in-memory [`TimingSeries`] is the source of truth for the current
/// sweep; every accepted sample is flushed to disk immediately.
#[derive(Debug)]
pub struct TimingLog {
    path: PathBuf,
    series: TimingSeries,
}

impl TimingLog {
    /// Start a fresh log at `path`, truncating any previous content and
    /// creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns error if the file or its directory cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(&path)?;
        Ok(Self {
            path,
            series: TimingSeries::new(),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Samples appended through this handle.
    #[must_use]
    pub const fn series(&self) -> &TimingSeries {
        &self.series
    }

    /// Append one sample to memory and disk.
    ///
    /// The sample is validated against the series first; nothing is written
    /// if it would break the ordering invariant. The file must still hold
    /// exactly the samples appended through this handle.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` on ordering violations, `LogDiverged` if
    /// something else wrote to (or truncated) the file, and IO errors on
    /// write failure.
    pub fn append(&mut self, sample: TimingSample) -> Result<()> {
        let mut staged = self.series.clone();
        staged.push(sample)?;

        let on_disk = match Self::read(&self.path, "") {
            Ok(samples) => samples,
            Err(Error::MissingArtifact { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };
        if on_disk != self.series.samples() {
            return Err(Error::LogDiverged {
                path: self.path.clone(),
                expected: self.series.len(),
                found: on_disk.len(),
            });
        }

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(format!("{sample}\n").as_bytes())?;
        file.sync_data()?;

        self.series = staged;
        Ok(())
    }

    /// Read every sample in a timing log, in file order.
    ///
    /// Blank lines are skipped. Duplicate trajectory counts (from sweeps that
    /// skipped truncation) are all retained.
    ///
    /// # Errors
    ///
    /// Returns `MissingArtifact` if the file does not exist and `Parse` on
    /// the first malformed line.
    pub fn read<P: AsRef<Path>>(path: P, implementation: &str) -> Result<Vec<TimingSample>> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::MissingArtifact {
                    implementation: implementation.to_string(),
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut samples = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            match TimingSample::parse_line(&line) {
                Ok(Some(sample)) => samples.push(sample),
                Ok(None) => {}
                Err(reason) => {
                    return Err(Error::Parse {
                        path: path.to_path_buf(),
                        line: idx + 1,
                        reason,
                    });
                }
            }
        }
        Ok(samples)
    }
}
