//! Trajectory-count sweep driver
//!
//! Runs one [`SolverRunner`] over a geometric progression of ensemble sizes
//! (8, 32, 128, ... up to a bound) and appends each reported best time to
//! the (implementation, mode) timing log.
//!
//! ## Semantics
//!
//! - The implementation's timing logs are truncated before the first step,
//!   so a re-run never mixes samples from two sweeps.
//! - Steps run strictly one after another; a runner returns only once its
//!   benchmark has finished.
//! - A failed step appends nothing for any mode, is logged, and the sweep
//!   carries on with the next size.
//! - Only failing to write the implementation's own output aborts the sweep,
//!   and so does finding that output modified by someone else.
//! - A state artifact counts as written at the reference step only if it
//!   is new or changed since the sweep started.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ode_bench::config::BenchConfig;
//! use ode_bench::runner::CommandRunner;
//! use ode_bench::sweep::SweepDriver;
//!
//! let config = BenchConfig::builder().data_dir("data").build()?;
//! let runner = CommandRunner::new(&config, config.runner("jax")?);
//! let report = SweepDriver::new(&config).run(&runner, 32_768)?;
//! println!("{} failed iterations", report.failures().len());
//! # Ok::<(), ode_bench::Error>(())
//! ```

mod record;

pub use record::{SweepFailure, SweepRecord, SweepStatus};

use crate::config::BenchConfig;
use crate::runner::{RunnerOutput, SolverRunner};
use crate::timing::{SteppingMode, TimingLog, TimingSample, TimingSeries};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{info, warn};

/// File name of the sweep manifest inside an implementation directory
pub const MANIFEST_FILE: &str = "sweep.json";

/// Geometric progression of trajectory counts: `start, start*factor, ...`
/// while the count stays `<= max`.
///
/// Stops early instead of overflowing.
#[derive(Debug, Clone)]
pub struct TrajectorySweep {
    next: Option<u64>,
    factor: u64,
    max: u64,
}

impl TrajectorySweep {
    /// Create a progression.
    #[must_use]
    pub const fn new(start: u64, factor: u64, max: u64) -> Self {
        Self {
            next: Some(start),
            factor,
            max,
        }
    }

    /// Progression configured in `config`, bounded by `max`.
    #[must_use]
    pub const fn from_config(config: &BenchConfig, max: u64) -> Self {
        Self::new(config.sweep_start(), config.sweep_factor(), max)
    }
}

impl Iterator for TrajectorySweep {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let n = self.next.filter(|&n| n > 0 && n <= self.max)?;
        self.next = n.checked_mul(self.factor).filter(|&m| m > n);
        Some(n)
    }
}

/// Outcome of one implementation's sweep.
#[derive(Debug, Clone)]
pub struct SweepReport {
    record: SweepRecord,
    series: BTreeMap<SteppingMode, TimingSeries>,
    missing_artifacts: Vec<PathBuf>,
}

impl SweepReport {
    /// Implementation that was swept.
    #[must_use]
    pub fn implementation(&self) -> &str {
        self.record.implementation()
    }

    /// Lifecycle record, as written to the manifest.
    #[must_use]
    pub const fn record(&self) -> &SweepRecord {
        &self.record
    }

    /// Samples appended for `mode` during this sweep.
    #[must_use]
    pub fn series(&self, mode: SteppingMode) -> Option<&TimingSeries> {
        self.series.get(&mode)
    }

    /// Iterations that produced no samples.
    #[must_use]
    pub fn failures(&self) -> &[SweepFailure] {
        self.record.failures()
    }

    /// State artifacts the runner was expected to write at the reference
    /// trajectory count but did not: absent, or left as they were before
    /// the sweep started.
    #[must_use]
    pub fn missing_artifacts(&self) -> &[PathBuf] {
        &self.missing_artifacts
    }

    /// Whether every iteration succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.record.status() == SweepStatus::Success
    }
}

/// Drives sweeps using the layout and progression of one configuration.
#[derive(Debug, Clone, Copy)]
pub struct SweepDriver<'a> {
    config: &'a BenchConfig,
}

impl<'a> SweepDriver<'a> {
    /// Create a driver.
    #[must_use]
    pub const fn new(config: &'a BenchConfig) -> Self {
        Self { config }
    }

    /// Sweep `runner` from the configured start up to `max_trajectories`.
    ///
    /// A bound below the start yields an empty (successful) sweep.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the runner is not registered, IO errors if
    /// the implementation's output directory cannot be cleared or written,
    /// and `LogDiverged` if a timing log was written by anyone but the driver.
    /// Runner failures are not errors here; they are collected in the report.
    pub fn run(&self, runner: &dyn SolverRunner, max_trajectories: u64) -> Result<SweepReport> {
        let spec = self.config.runner(runner.name())?;
        let dir = self.config.implementation_dir(spec);
        let modes = runner.modes().to_vec();

        clear_previous_sweep(self.config, spec, &dir)?;

        let artifacts: Vec<(PathBuf, Option<FileStamp>)> = spec
            .artifacts
            .iter()
            .map(|name| {
                let path = self.config.artifact_path(name);
                let stamp = FileStamp::of(&path);
                (path, stamp)
            })
            .collect();

        let mut logs = Vec::with_capacity(modes.len());
        for &mode in &modes {
            logs.push((mode, TimingLog::create(self.config.timing_path(spec, mode))?));
        }

        let mut record = SweepRecord::new(runner.name(), max_trajectories);
        record.start();
        write_manifest(&dir, &record)?;

        let mut failures = Vec::new();
        let mut missing_artifacts = Vec::new();
        let mut iterations = 0;

        for n in TrajectorySweep::from_config(self.config, max_trajectories) {
            iterations += 1;
            info!(implementation = runner.name(), trajectories = n, "running sweep step");

            let samples = match runner.run(n).and_then(|out| collect_samples(runner, n, &out)) {
                Ok(samples) => samples,
                Err(e) => {
                    warn!(implementation = runner.name(), trajectories = n, error = %e, "sweep step failed, no sample recorded");
                    failures.push(SweepFailure {
                        trajectories: n,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            for ((mode, log), sample) in logs.iter_mut().zip(samples) {
                log.append(sample)?;
                info!(
                    implementation = runner.name(),
                    mode = %mode,
                    trajectories = n,
                    elapsed_ms = sample.elapsed_ms(),
                    "appended timing sample"
                );
            }

            if n == self.config.reference_trajectories() {
                for (path, before) in &artifacts {
                    match FileStamp::of(path) {
                        None => {
                            warn!(implementation = runner.name(), path = %path.display(), "reference state artifact not written");
                            missing_artifacts.push(path.clone());
                        }
                        Some(now) if before.as_ref() == Some(&now) => {
                            warn!(implementation = runner.name(), path = %path.display(), "reference state artifact is left over from before this sweep");
                            missing_artifacts.push(path.clone());
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        let series: BTreeMap<SteppingMode, TimingSeries> = logs
            .into_iter()
            .map(|(mode, log)| (mode, log.series().clone()))
            .collect();
        let counts = series.iter().map(|(&mode, s)| (mode, s.len())).collect();
        record.complete(counts, failures, iterations);
        write_manifest(&dir, &record)?;

        info!(
            implementation = runner.name(),
            status = ?record.status(),
            iterations,
            failed = record.failures().len(),
            "sweep finished"
        );

        Ok(SweepReport {
            record,
            series,
            missing_artifacts,
        })
    }
}

/// Turn one runner output into one validated sample per declared mode,
/// in declared-mode order. Either every mode yields a sample or none does.
fn collect_samples(
    runner: &dyn SolverRunner,
    trajectories: u64,
    output: &RunnerOutput,
) -> Result<Vec<TimingSample>> {
    runner
        .modes()
        .iter()
        .map(|&mode| {
            let elapsed = output.timing(mode).ok_or_else(|| Error::RunnerInvocation {
                implementation: runner.name().to_string(),
                trajectories,
                reason: format!("no timing reported for {mode}"),
            })?;
            TimingSample::new(trajectories, elapsed).map_err(|e| Error::RunnerInvocation {
                implementation: runner.name().to_string(),
                trajectories,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Modification time and length of a file, to tell a rewrite from a leftover.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok()?,
            len: meta.len(),
        })
    }
}

fn clear_previous_sweep(
    config: &BenchConfig,
    spec: &crate::config::RunnerSpec,
    dir: &Path,
) -> Result<()> {
    fs::create_dir_all(dir)?;
    let stale = SteppingMode::ALL
        .iter()
        .map(|&mode| config.timing_path(spec, mode))
        .chain(std::iter::once(dir.join(MANIFEST_FILE)));
    for path in stale {
        match fs::remove_file(&path) {
            Ok(()) => info!(path = %path.display(), "removed previous sweep output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn write_manifest(dir: &Path, record: &SweepRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    fs::write(dir.join(MANIFEST_FILE), json)?;
    Ok(())
}

/// Result of sweeping one implementation inside a multi-implementation run.
#[derive(Debug)]
pub struct SweepOutcome {
    /// Implementation name
    pub implementation: String,
    /// Sweep report, or the error that stopped this implementation
    pub result: Result<SweepReport>,
}

impl SweepOutcome {
    /// Whether the implementation swept without any failed iteration.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.as_ref().is_ok_and(SweepReport::is_success)
    }
}

/// Sweep several implementations. A failure of one never stops the others.
///
/// With the `parallel` feature the implementations run concurrently (each
/// sweep on its own stays sequential). Outcomes are returned in input order.
#[must_use]
pub fn run_sweeps(
    config: &BenchConfig,
    runners: &[Box<dyn SolverRunner>],
    max_trajectories: u64,
    parallel: bool,
) -> Vec<SweepOutcome> {
    let sweep_one = |runner: &Box<dyn SolverRunner>| {
        let result = SweepDriver::new(config).run(runner.as_ref(), max_trajectories);
        if let Err(e) = &result {
            warn!(implementation = runner.name(), error = %e, "sweep aborted");
        }
        SweepOutcome {
            implementation: runner.name().to_string(),
            result,
        }
    };

    map_runners(runners, parallel, sweep_one)
}

#[cfg(feature = "parallel")]
fn map_runners<F>(runners: &[Box<dyn SolverRunner>], parallel: bool, f: F) -> Vec<SweepOutcome>
where
    F: Fn(&Box<dyn SolverRunner>) -> SweepOutcome + Send + Sync,
{
    use rayon::prelude::*;

    if parallel {
        runners.par_iter().map(f).collect()
    } else {
        runners.iter().map(f).collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn map_runners<F>(runners: &[Box<dyn SolverRunner>], parallel: bool, f: F) -> Vec<SweepOutcome>
where
    F: Fn(&Box<dyn SolverRunner>) -> SweepOutcome + Send + Sync,
{
    if parallel {
        warn!("built without the parallel feature, sweeping sequentially");
    }
    runners.iter().map(f).collect()
}
