//! Shared fixtures for integration tests

#![allow(dead_code)]

use ode_bench::config::{BenchConfig, RunnerSpec};
use ode_bench::runner::{RunnerOutput, SolverRunner};
use ode_bench::timing::SteppingMode;
use ode_bench::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// In-process runner with scripted failures.
///
/// Reports `n * 0.5` ms for fixed and `n * 1.5` ms for adaptive stepping.
pub struct FakeRunner {
    name: String,
    modes: Vec<SteppingMode>,
    fail_at: Vec<u64>,
    report_only: Option<SteppingMode>,
    artifact: Option<(PathBuf, u64)>,
    calls: Mutex<Vec<u64>>,
}

impl FakeRunner {
    pub fn new(name: &str, modes: &[SteppingMode]) -> Self {
        Self {
            name: name.to_string(),
            modes: modes.to_vec(),
            fail_at: Vec::new(),
            report_only: None,
            artifact: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(mut self, counts: &[u64]) -> Self {
        self.fail_at = counts.to_vec();
        self
    }

    /// Report a timing for this mode only, whatever the declared modes are.
    pub fn reporting_only(mut self, mode: SteppingMode) -> Self {
        self.report_only = Some(mode);
        self
    }

    /// Write a one-row state table to `path` when run at `trajectories`.
    pub fn writing_artifact(mut self, path: &Path, trajectories: u64) -> Self {
        self.artifact = Some((path.to_path_buf(), trajectories));
        self
    }

    pub fn calls(&self) -> Vec<u64> {
        self.calls.lock().unwrap().clone()
    }
}

#[allow(clippy::cast_precision_loss)]
impl SolverRunner for FakeRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn modes(&self) -> &[SteppingMode] {
        &self.modes
    }

    fn run(&self, trajectories: u64) -> Result<RunnerOutput> {
        self.calls.lock().unwrap().push(trajectories);
        if self.fail_at.contains(&trajectories) {
            return Err(Error::RunnerInvocation {
                implementation: self.name.clone(),
                trajectories,
                reason: "exited with exit status: 1".to_string(),
            });
        }
        if let Some((path, at)) = &self.artifact {
            if *at == trajectories {
                write_matrix(path, &[vec![trajectories as f64, 0.0, 0.0]]);
            }
        }
        let n = trajectories as f64;
        let mut output = RunnerOutput::new();
        for &mode in &self.modes {
            if self.report_only.is_some_and(|only| only != mode) {
                continue;
            }
            let ms = match mode {
                SteppingMode::Fixed => n * 0.5,
                SteppingMode::Adaptive => n * 1.5,
            };
            output = output.with_timing(mode, ms);
        }
        Ok(output)
    }
}

/// Registry entry matching a [`FakeRunner`] of the same name.
pub fn fake_spec(name: &str, modes: &[SteppingMode]) -> RunnerSpec {
    RunnerSpec {
        name: name.to_string(),
        program: "unused".to_string(),
        args: Vec::new(),
        modes: modes.to_vec(),
        output_dir: name.to_uppercase(),
        file_prefix: name.to_string(),
        artifacts: vec![name.to_string()],
        working_dir: None,
        sandbox: false,
    }
}

pub fn config_with(dir: &Path, specs: Vec<RunnerSpec>) -> BenchConfig {
    BenchConfig::builder()
        .data_dir(dir)
        .runners(specs)
        .extra_artifacts(Vec::new())
        .build()
        .unwrap()
}

/// Write a headerless comma-separated state table.
pub fn write_matrix(path: &Path, rows: &[Vec<f64>]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let text: String = rows
        .iter()
        .map(|row| {
            let cells: Vec<String> = row.iter().map(|v| format!("{v:.18e}")).collect();
            cells.join(",") + "\n"
        })
        .collect();
    std::fs::write(path, text).unwrap();
}
