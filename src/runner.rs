//! External solver runners
//!
//! A runner is anything that, given a trajectory count, benchmarks one or
//! more stepping modes of an ODE ensemble solve and reports the best
//! wall-clock time of each. The best-of-N minimum is computed by the runner;
//! this crate only parses and stores it.
//!
//! [`CommandRunner`] adapts the benchmark scripts of each ecosystem (CUBIE,
//! JAX/Diffrax, PyTorch/torchdiffeq, ...) to the [`SolverRunner`] trait. The
//! scripts announce their timings on stdout:
//!
//! ```text
//! 8192 ODE solves with fixed time-stepping completed in 12.4 ms
//! 8192 ODE solves with adaptive time-stepping completed in 30.1 ms
//! ```
//!
//! Those scripts also keep their own timing logs and state tables under
//! `./data`, and round the stdout figure to 0.1 ms. A sandboxed runner
//! ([`RunnerSpec::sandbox`]) is started in a fresh directory below
//! `<data_dir>/.sandbox/<name>`. What it leaves there is harvested after a
//! successful run: the full-precision value in its own log replaces the
//! rounded stdout timing, and its state tables are moved into the
//! configured `numerical_dir`. The driver's logs are never handed to it.

use crate::config::{BenchConfig, RunnerSpec};
use crate::model::Model;
use crate::timing::{SteppingMode, TimingLog};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Environment variable carrying the timing output root
pub const ENV_DATA_DIR: &str = "ODE_BENCH_DATA_DIR";

/// Environment variable carrying the state artifact directory
pub const ENV_NUMERICAL_DIR: &str = "ODE_BENCH_NUMERICAL_DIR";

/// Environment variable carrying the reference trajectory count
pub const ENV_REFERENCE_TRAJECTORIES: &str = "ODE_BENCH_REFERENCE_TRAJECTORIES";

/// Environment variable carrying the name of the varied model parameter
pub const ENV_PARAMETER: &str = "ODE_BENCH_PARAMETER";

/// Environment variable carrying the parameter range as `lo,hi`
pub const ENV_PARAMETER_RANGE: &str = "ODE_BENCH_PARAMETER_RANGE";

/// Environment variable carrying the integration interval as `t0,t1`
pub const ENV_TSPAN: &str = "ODE_BENCH_TSPAN";

/// Environment variable carrying the initial state, comma separated
pub const ENV_INITIAL_STATE: &str = "ODE_BENCH_INITIAL_STATE";

/// Directory under `data_dir` holding one sandbox per runner
pub const SANDBOX_DIR: &str = ".sandbox";

/// Output root of a runner, relative to its working directory
const RUNNER_DATA_DIR: &str = "data";

/// State table directory of a runner, relative to [`RUNNER_DATA_DIR`]
const RUNNER_NUMERICAL_DIR: &str = "numerical";

/// Best timings reported by one runner invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerOutput {
    timings: BTreeMap<SteppingMode, f64>,
}

impl RunnerOutput {
    /// Create an empty output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the best time for one mode.
    #[must_use]
    pub fn with_timing(mut self, mode: SteppingMode, elapsed_ms: f64) -> Self {
        self.timings.insert(mode, elapsed_ms);
        self
    }

    /// Best time for `mode`, if reported.
    #[must_use]
    pub fn timing(&self, mode: SteppingMode) -> Option<f64> {
        self.timings.get(&mode).copied()
    }

    /// All reported (mode, milliseconds) pairs in mode order.
    pub fn timings(&self) -> impl Iterator<Item = (SteppingMode, f64)> + '_ {
        self.timings.iter().map(|(&mode, &ms)| (mode, ms))
    }
}

/// Capability interface for one external solver ecosystem.
///
/// Implementations must block until the benchmark for `trajectories` has
/// fully finished so that the next sweep step starts on a quiescent device.
pub trait SolverRunner: Send + Sync {
    /// Implementation name used for logging and output layout
    fn name(&self) -> &str;

    /// Stepping modes benchmarked by every invocation
    fn modes(&self) -> &[SteppingMode];

    /// Run the benchmark for one ensemble size
    ///
    /// # Errors
    ///
    /// Returns `RunnerInvocation` if the runner fails or its output is
    /// missing a declared mode.
    fn run(&self, trajectories: u64) -> Result<RunnerOutput>;
}

/// Runner backed by an external process.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    spec: RunnerSpec,
    model: Model,
    data_dir: PathBuf,
    numerical_dir: PathBuf,
    artifact_paths: Vec<PathBuf>,
    reference_trajectories: u64,
}

impl CommandRunner {
    /// Create a runner for `spec` using the layout in `config`.
    #[must_use]
    pub fn new(config: &BenchConfig, spec: &RunnerSpec) -> Self {
        Self {
            spec: spec.clone(),
            model: config.model(),
            data_dir: config.data_dir().to_path_buf(),
            numerical_dir: config.numerical_dir().to_path_buf(),
            artifact_paths: spec
                .artifacts
                .iter()
                .map(|name| config.artifact_path(name))
                .collect(),
            reference_trajectories: config.reference_trajectories(),
        }
    }

    /// Registry entry this runner was built from.
    #[must_use]
    pub const fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    /// Sandbox directory of this runner when the driver runs in `cwd`.
    #[must_use]
    pub fn sandbox_dir(&self, cwd: &Path) -> PathBuf {
        cwd.join(&self.data_dir).join(SANDBOX_DIR).join(&self.spec.name)
    }

    fn invocation_error(&self, trajectories: u64, reason: impl Into<String>) -> Error {
        Error::RunnerInvocation {
            implementation: self.spec.name.clone(),
            trajectories,
            reason: reason.into(),
        }
    }

    /// Empty the sandbox and lay out the directories the runner writes into.
    fn prepare_sandbox(&self, root: &Path) -> std::io::Result<()> {
        match fs::remove_dir_all(root) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        let data = root.join(RUNNER_DATA_DIR);
        fs::create_dir_all(data.join(&self.spec.output_dir))?;
        fs::create_dir_all(data.join(RUNNER_NUMERICAL_DIR))
    }

    /// Take full-precision timings and state tables out of a sandbox.
    fn harvest(&self, root: &Path, trajectories: u64, mut output: RunnerOutput) -> Result<RunnerOutput> {
        let data = root.join(RUNNER_DATA_DIR);

        for &mode in &self.spec.modes {
            let log = data
                .join(&self.spec.output_dir)
                .join(self.spec.timing_file_name(mode));
            let samples = match TimingLog::read(&log, &self.spec.name) {
                Ok(samples) => samples,
                Err(Error::MissingArtifact { .. }) => continue,
                Err(e) => return Err(self.invocation_error(trajectories, e.to_string())),
            };
            if let Some(sample) = samples.iter().rev().find(|s| s.trajectories() == trajectories) {
                debug!(implementation = %self.spec.name, mode = %mode, elapsed_ms = sample.elapsed_ms(), "timing taken from runner log");
                output = output.with_timing(mode, sample.elapsed_ms());
            }
        }

        for dest in &self.artifact_paths {
            let Some(file_name) = dest.file_name() else {
                continue;
            };
            let written = data.join(RUNNER_NUMERICAL_DIR).join(file_name);
            if written.exists() {
                move_file(&written, dest).map_err(|e| {
                    self.invocation_error(
                        trajectories,
                        format!("failed to move {} to {}: {e}", written.display(), dest.display()),
                    )
                })?;
                info!(implementation = %self.spec.name, path = %dest.display(), "collected state artifact");
            }
        }

        Ok(output)
    }
}

/// Join values as a comma separated list.
fn csv_values(values: &[f64]) -> String {
    values.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

/// `arg` as an absolute path if it names an existing file under `base`.
fn anchored(arg: &str, base: &Path) -> OsString {
    let path = Path::new(arg);
    if path.is_relative() && !arg.starts_with('-') {
        let candidate = base.join(path);
        if candidate.exists() {
            return candidate.into_os_string();
        }
    }
    OsString::from(arg)
}

fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

impl SolverRunner for CommandRunner {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn modes(&self) -> &[SteppingMode] {
        &self.spec.modes
    }

    fn run(&self, trajectories: u64) -> Result<RunnerOutput> {
        let cwd = std::env::current_dir()
            .map_err(|e| self.invocation_error(trajectories, format!("no working directory: {e}")))?;
        let base = self
            .spec
            .working_dir
            .as_ref()
            .map_or_else(|| cwd.clone(), |dir| cwd.join(dir));

        let sandbox = if self.spec.sandbox {
            let root = self.sandbox_dir(&cwd);
            self.prepare_sandbox(&root).map_err(|e| {
                self.invocation_error(
                    trajectories,
                    format!("failed to prepare sandbox {}: {e}", root.display()),
                )
            })?;
            Some(root)
        } else {
            None
        };

        let (data_dir, numerical_dir) = match &sandbox {
            Some(root) => {
                let data = root.join(RUNNER_DATA_DIR);
                let numerical = data.join(RUNNER_NUMERICAL_DIR);
                (data, numerical)
            }
            None => (cwd.join(&self.data_dir), cwd.join(&self.numerical_dir)),
        };
        let (lo, hi) = self.model.parameter_range();
        let (t0, t1) = self.model.tspan();

        let mut command = match &sandbox {
            Some(root) => {
                let program = if self.spec.program.contains(std::path::MAIN_SEPARATOR) {
                    anchored(&self.spec.program, &base)
                } else {
                    OsString::from(&self.spec.program)
                };
                let mut command = Command::new(program);
                command
                    .args(self.spec.args.iter().map(|arg| anchored(arg, &base)))
                    .current_dir(root);
                command
            }
            None => {
                let mut command = Command::new(&self.spec.program);
                command.args(&self.spec.args).current_dir(&base);
                command
            }
        };
        command
            .arg(trajectories.to_string())
            .arg(self.model.name())
            .env(ENV_DATA_DIR, &data_dir)
            .env(ENV_NUMERICAL_DIR, &numerical_dir)
            .env(
                ENV_REFERENCE_TRAJECTORIES,
                self.reference_trajectories.to_string(),
            )
            .env(ENV_PARAMETER, self.model.parameter_name())
            .env(ENV_PARAMETER_RANGE, csv_values(&[lo, hi]))
            .env(ENV_TSPAN, csv_values(&[t0, t1]))
            .env(ENV_INITIAL_STATE, csv_values(self.model.initial_state()));

        debug!(implementation = %self.spec.name, trajectories, program = %self.spec.program, sandboxed = sandbox.is_some(), "launching runner");
        let output = command
            .output()
            .map_err(|e| self.invocation_error(trajectories, format!("failed to launch {}: {e}", self.spec.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(self.invocation_error(
                trajectories,
                format!("exited with {}: {}", output.status, tail.join(" | ")),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let reported = parse_runner_output(&stdout, trajectories, &self.spec.modes)
            .map_err(|reason| self.invocation_error(trajectories, reason))?;
        match &sandbox {
            Some(root) => self.harvest(root, trajectories, reported),
            None => Ok(reported),
        }
    }
}

fn parse_timing_line(line: &str) -> Option<(&str, &str, &str)> {
    let (count, rest) = line.trim().split_once(" ODE solves with ")?;
    let (mode, rest) = rest.split_once(" time-stepping completed in ")?;
    let value = rest.trim().strip_suffix("ms")?.trim();
    Some((count.trim(), mode.trim(), value))
}

/// Extract the best timing of every expected mode from runner stdout.
///
/// Lines that are not timing announcements are ignored. Announcements for
/// modes not in `expected` are ignored too.
///
/// # Errors
///
/// Returns a description of the problem if an expected mode is missing or
/// reported twice, the reported trajectory count differs from `trajectories`,
/// or a timing is not a non-negative finite number.
pub fn parse_runner_output(
    stdout: &str,
    trajectories: u64,
    expected: &[SteppingMode],
) -> std::result::Result<RunnerOutput, String> {
    let mut output = RunnerOutput::new();

    for (count, mode, value) in stdout.lines().filter_map(parse_timing_line) {
        let Ok(mode) = mode.parse::<SteppingMode>() else {
            debug!(mode, "ignoring timing for unknown stepping mode");
            continue;
        };
        if !expected.contains(&mode) {
            continue;
        }
        let count: u64 = count
            .parse()
            .map_err(|_| format!("bad trajectory count {count:?} in {mode} timing"))?;
        if count != trajectories {
            return Err(format!(
                "{mode} timing reported for {count} trajectories, expected {trajectories}"
            ));
        }
        let elapsed: f64 = value
            .parse()
            .map_err(|_| format!("bad {mode} timing {value:?}"))?;
        if !elapsed.is_finite() || elapsed < 0.0 {
            return Err(format!("{mode} timing {elapsed} is not a valid duration"));
        }
        if output.timing(mode).is_some() {
            return Err(format!("{mode} timing reported more than once"));
        }
        output = output.with_timing(mode, elapsed);
    }

    let missing: Vec<&str> = expected
        .iter()
        .filter(|mode| output.timing(**mode).is_none())
        .map(|mode| mode.label())
        .collect();
    if !missing.is_empty() {
        return Err(format!("no timing reported for {}", missing.join(", ")));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOTH: [SteppingMode; 2] = [SteppingMode::Fixed, SteppingMode::Adaptive];

    #[test]
    fn test_parse_both_modes() {
        let stdout = "Working on : gpu\n\
                      32 ODE solves with fixed time-stepping completed in 1.5 ms\n\
                      32 ODE solves with adaptive time-stepping completed in 4.0 ms\n";
        let output = parse_runner_output(stdout, 32, &BOTH).unwrap();
        assert_eq!(output.timing(SteppingMode::Fixed), Some(1.5));
        assert_eq!(output.timing(SteppingMode::Adaptive), Some(4.0));
    }

    #[test]
    fn test_parse_missing_mode() {
        let stdout = "8 ODE solves with fixed time-stepping completed in 0.3 ms\n";
        let err = parse_runner_output(stdout, 8, &BOTH).unwrap_err();
        assert!(err.contains("no timing reported for adaptive"));
    }

    #[test]
    fn test_parse_undeclared_mode_ignored() {
        let stdout = "8 ODE solves with fixed time-stepping completed in 0.3 ms\n\
                      8 ODE solves with adaptive time-stepping completed in 0.9 ms\n";
        let output = parse_runner_output(stdout, 8, &[SteppingMode::Fixed]).unwrap();
        assert_eq!(output.timings().count(), 1);
    }

    #[test]
    fn test_parse_count_mismatch() {
        let stdout = "32 ODE solves with fixed time-stepping completed in 0.3 ms\n";
        let err = parse_runner_output(stdout, 8, &[SteppingMode::Fixed]).unwrap_err();
        assert!(err.contains("expected 8"));
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        let nan = "8 ODE solves with fixed time-stepping completed in nan ms\n";
        assert!(parse_runner_output(nan, 8, &[SteppingMode::Fixed]).is_err());
        let neg = "8 ODE solves with fixed time-stepping completed in -1.0 ms\n";
        assert!(parse_runner_output(neg, 8, &[SteppingMode::Fixed]).is_err());
        let junk = "8 ODE solves with fixed time-stepping completed in fast ms\n";
        assert!(parse_runner_output(junk, 8, &[SteppingMode::Fixed]).is_err());
    }

    #[test]
    fn test_parse_duplicate_mode() {
        let stdout = "8 ODE solves with fixed time-stepping completed in 0.3 ms\n\
                      8 ODE solves with fixed time-stepping completed in 0.2 ms\n";
        let err = parse_runner_output(stdout, 8, &[SteppingMode::Fixed]).unwrap_err();
        assert!(err.contains("more than once"));
    }

    #[test]
    fn test_csv_values() {
        assert_eq!(csv_values(&[0.0, 21.0]), "0,21");
        assert_eq!(csv_values(Model::VanDerPol.initial_state()), "2,0");
        assert_eq!(csv_values(&[]), "");
    }

    #[test]
    fn test_anchored_only_existing_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bench.py"), "").unwrap();

        assert_eq!(anchored("bench.py", dir.path()), dir.path().join("bench.py").into_os_string());
        assert_eq!(anchored("missing.py", dir.path()), OsString::from("missing.py"));
        assert_eq!(anchored("-c", dir.path()), OsString::from("-c"));
    }

    #[test]
    fn test_parse_timing_line_shapes() {
        assert_eq!(
            parse_timing_line("  128 ODE solves with adaptive time-stepping completed in 2.0 ms  "),
            Some(("128", "adaptive", "2.0"))
        );
        assert_eq!(parse_timing_line("CUDA enabled:  True"), None);
    }
}
