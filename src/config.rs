//! Benchmark configuration
//!
//! Output layout, sweep progression, and the runner registry are carried in
//! one [`BenchConfig`] value that both the sweep driver and the comparator
//! receive explicitly. Nothing depends on the process working directory
//! beyond the relative paths a caller chooses to put in here.
//!
//! ```text
//! <data_dir>/
//! ├── CUBIE/Cubie_times_unadaptive.txt
//! ├── CUBIE/Cubie_times_adaptive.txt
//! ├── CUBIE/sweep.json
//! ├── JAX/...
//! └── numerical/<artifact>.csv      (numerical_dir)
//! ```

use crate::model::Model;
use crate::timing::SteppingMode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Default first trajectory count of a sweep
pub const DEFAULT_SWEEP_START: u64 = 8;

/// Default geometric growth factor between sweep steps
pub const DEFAULT_SWEEP_FACTOR: u64 = 4;

/// Trajectory count at which runners persist their final-state table
pub const DEFAULT_REFERENCE_TRAJECTORIES: u64 = 32_768;

/// How to invoke one external solver runner and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerSpec {
    /// Implementation name used on the command line
    pub name: String,
    /// Executable to launch
    pub program: String,
    /// Arguments placed before the trajectory count and model name
    #[serde(default)]
    pub args: Vec<String>,
    /// Stepping modes this runner benchmarks in one invocation
    pub modes: Vec<SteppingMode>,
    /// Directory under `data_dir` holding this runner's timing logs
    pub output_dir: String,
    /// File name prefix of the timing logs (`<prefix>_times_<mode>.txt`)
    pub file_prefix: String,
    /// Names of the state artifacts this runner writes at the reference count
    #[serde(default)]
    pub artifacts: Vec<String>,
    /// Working directory for the child process
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Run every invocation in a fresh directory owned by the driver.
    ///
    /// For runners that write their own `./data/...` logs and state tables
    /// relative to their working directory. Their timing logs are read back
    /// for full-precision values and their state tables are moved into
    /// `numerical_dir`; nothing they write lands on the driver's logs.
    #[serde(default)]
    pub sandbox: bool,
}

impl RunnerSpec {
    fn python(
        name: &str,
        dir: &str,
        script: &str,
        modes: &[SteppingMode],
        output_dir: &str,
        file_prefix: &str,
        artifacts: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            program: format!("{dir}/venv/bin/python"),
            args: vec![format!("{dir}/{script}")],
            modes: modes.to_vec(),
            output_dir: output_dir.to_string(),
            file_prefix: file_prefix.to_string(),
            artifacts: artifacts.iter().map(ToString::to_string).collect(),
            working_dir: None,
            sandbox: true,
        }
    }

    /// File name of the timing log for `mode` (`<prefix>_times_<suffix>.txt`).
    #[must_use]
    pub fn timing_file_name(&self, mode: SteppingMode) -> String {
        format!("{}_times_{}.txt", self.file_prefix, mode.file_suffix())
    }

    /// Runners of the GPU ODE benchmark suite.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        use SteppingMode::{Adaptive, Fixed};
        vec![
            Self::python(
                "cubie",
                "GPU_ODE_CUBIE",
                "bench_cubie.py",
                &[Fixed, Adaptive],
                "CUBIE",
                "Cubie",
                &["cubie_unadaptive", "cubie_adaptive"],
            ),
            Self::python(
                "jax",
                "GPU_ODE_JAX",
                "bench_diffrax.py",
                &[Fixed, Adaptive],
                "JAX",
                "Jax",
                &["jax"],
            ),
            Self::python(
                "pytorch",
                "GPU_ODE_PyTorch",
                "bench_torchdiffeq.py",
                &[Fixed],
                "PYTORCH",
                "Torch",
                &["pytorch"],
            ),
        ]
    }
}

/// JSON registry file overriding the built-in runners.
///
/// ```json
/// {
///   "runners": [
///     { "name": "jax", "program": "python3", "args": ["bench_diffrax.py"],
///       "modes": ["fixed", "adaptive"], "output_dir": "JAX",
///       "file_prefix": "Jax", "artifacts": ["jax"] }
///   ],
///   "extra_artifacts": ["julia_fixed"]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryFile {
    /// Runner definitions
    pub runners: Vec<RunnerSpec>,
    /// State artifacts produced outside the sweep driver that should still be compared
    #[serde(default)]
    pub extra_artifacts: Vec<String>,
}

impl RegistryFile {
    /// Read a registry from disk.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file cannot be read or is not a valid registry.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read registry {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            Error::Config(format!("invalid registry {}: {e}", path.display()))
        })
    }
}

/// Process-wide benchmark configuration.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    data_dir: PathBuf,
    numerical_dir: PathBuf,
    sweep_start: u64,
    sweep_factor: u64,
    reference_trajectories: u64,
    model: Model,
    runners: Vec<RunnerSpec>,
    extra_artifacts: Vec<String>,
}

impl BenchConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> BenchConfigBuilder {
        BenchConfigBuilder::default()
    }

    /// Root of all timing output.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding state artifacts.
    #[must_use]
    pub fn numerical_dir(&self) -> &Path {
        &self.numerical_dir
    }

    /// First trajectory count of every sweep.
    #[must_use]
    pub const fn sweep_start(&self) -> u64 {
        self.sweep_start
    }

    /// Growth factor between sweep steps.
    #[must_use]
    pub const fn sweep_factor(&self) -> u64 {
        self.sweep_factor
    }

    /// Trajectory count at which state artifacts are written.
    #[must_use]
    pub const fn reference_trajectories(&self) -> u64 {
        self.reference_trajectories
    }

    /// Model runners are asked to integrate.
    #[must_use]
    pub const fn model(&self) -> Model {
        self.model
    }

    /// Registered runners, in registry order.
    #[must_use]
    pub fn runners(&self) -> &[RunnerSpec] {
        &self.runners
    }

    /// Look up a runner by name.
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the known runners if `name` is not registered.
    pub fn runner(&self, name: &str) -> Result<&RunnerSpec> {
        self.runners.iter().find(|r| r.name == name).ok_or_else(|| {
            let known: Vec<&str> = self.runners.iter().map(|r| r.name.as_str()).collect();
            Error::Config(format!(
                "unknown implementation {name:?} (known: {})",
                known.join(", ")
            ))
        })
    }

    /// Directory holding one runner's timing logs and sweep manifest.
    #[must_use]
    pub fn implementation_dir(&self, runner: &RunnerSpec) -> PathBuf {
        self.data_dir.join(&runner.output_dir)
    }

    /// Timing log path for one (runner, mode).
    #[must_use]
    pub fn timing_path(&self, runner: &RunnerSpec, mode: SteppingMode) -> PathBuf {
        self.implementation_dir(runner).join(runner.timing_file_name(mode))
    }

    /// State artifact path for one artifact name.
    #[must_use]
    pub fn artifact_path(&self, artifact: &str) -> PathBuf {
        self.numerical_dir.join(format!("{artifact}.csv"))
    }

    /// Every state artifact name the comparator should look for: runner
    /// artifacts in registry order, then extras, without duplicates.
    #[must_use]
    pub fn artifact_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.runners
            .iter()
            .flat_map(|r| r.artifacts.iter())
            .chain(self.extra_artifacts.iter())
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect()
    }
}

/// Builder for [`BenchConfig`]
#[derive(Debug, Default)]
pub struct BenchConfigBuilder {
    data_dir: Option<PathBuf>,
    numerical_dir: Option<PathBuf>,
    sweep_start: Option<u64>,
    sweep_factor: Option<u64>,
    reference_trajectories: Option<u64>,
    model: Option<Model>,
    runners: Option<Vec<RunnerSpec>>,
    extra_artifacts: Option<Vec<String>>,
}

impl BenchConfigBuilder {
    /// Set the timing output root (default `./data`)
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Set the state artifact directory (default `<data_dir>/numerical`)
    #[must_use]
    pub fn numerical_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.numerical_dir = Some(dir.into());
        self
    }

    /// Set the first trajectory count of a sweep
    #[must_use]
    pub const fn sweep_start(mut self, start: u64) -> Self {
        self.sweep_start = Some(start);
        self
    }

    /// Set the geometric growth factor of a sweep
    #[must_use]
    pub const fn sweep_factor(mut self, factor: u64) -> Self {
        self.sweep_factor = Some(factor);
        self
    }

    /// Set the trajectory count at which runners write state artifacts
    #[must_use]
    pub const fn reference_trajectories(mut self, n: u64) -> Self {
        self.reference_trajectories = Some(n);
        self
    }

    /// Set the model runners integrate
    #[must_use]
    pub const fn model(mut self, model: Model) -> Self {
        self.model = Some(model);
        self
    }

    /// Replace the runner registry
    #[must_use]
    pub fn runners(mut self, runners: Vec<RunnerSpec>) -> Self {
        self.runners = Some(runners);
        self
    }

    /// Replace the list of externally produced artifacts to compare
    #[must_use]
    pub fn extra_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.extra_artifacts = Some(artifacts);
        self
    }

    /// Load runners and extra artifacts from a JSON registry file
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file is unreadable or invalid.
    pub fn registry_file<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        let registry = RegistryFile::load(path)?;
        Ok(self
            .runners(registry.runners)
            .extra_artifacts(registry.extra_artifacts))
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns `Config` if the sweep progression is degenerate or the
    /// registry has duplicate, unnamed, or mode-less runners.
    pub fn build(self) -> Result<BenchConfig> {
        let data_dir = self.data_dir.unwrap_or_else(|| PathBuf::from("data"));
        let numerical_dir = self
            .numerical_dir
            .unwrap_or_else(|| data_dir.join("numerical"));
        let sweep_start = self.sweep_start.unwrap_or(DEFAULT_SWEEP_START);
        let sweep_factor = self.sweep_factor.unwrap_or(DEFAULT_SWEEP_FACTOR);

        if sweep_start == 0 {
            return Err(Error::Config("sweep start must be positive".to_string()));
        }
        if sweep_factor < 2 {
            return Err(Error::Config(format!(
                "sweep factor must be at least 2, got {sweep_factor}"
            )));
        }

        let runners = self.runners.unwrap_or_else(RunnerSpec::defaults);
        let mut names = HashSet::new();
        for runner in &runners {
            if runner.name.is_empty() || runner.name.contains(['/', '\\']) {
                return Err(Error::Config(format!(
                    "invalid implementation name {:?}",
                    runner.name
                )));
            }
            if !names.insert(runner.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate implementation {:?}",
                    runner.name
                )));
            }
            if runner.modes.is_empty() {
                return Err(Error::Config(format!(
                    "implementation {:?} declares no stepping modes",
                    runner.name
                )));
            }
        }

        Ok(BenchConfig {
            data_dir,
            numerical_dir,
            sweep_start,
            sweep_factor,
            reference_trajectories: self
                .reference_trajectories
                .unwrap_or(DEFAULT_REFERENCE_TRAJECTORIES),
            model: self.model.unwrap_or_default(),
            runners,
            extra_artifacts: self.extra_artifacts.unwrap_or_else(|| {
                vec![
                    "julia_adaptive".to_string(),
                    "julia_fixed".to_string(),
                    "mpgos".to_string(),
                ]
            }),
        })
    }
}
