//! Sweep Record - lifecycle manifest of one sweep run

use crate::timing::SteppingMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status of a sweep run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepStatus {
    /// Sweep is created but not yet started.
    Pending,
    /// Sweep is currently iterating.
    Running,
    /// Every iteration produced a sample (including sweeps with zero iterations).
    Success,
    /// Some iterations failed, others produced samples.
    Partial,
    /// Every iteration failed.
    Failed,
}

/// One iteration that did not produce timing samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    /// Trajectory count of the failed iteration
    pub trajectories: u64,
    /// Why the iteration failed
    pub reason: String,
}

/// Sweep Record written as `sweep.json` beside the timing logs.
///
/// The timing logs stay the authoritative data; this manifest only tells a
/// reader how the sweep that produced them went.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepRecord {
    implementation: String,
    max_trajectories: u64,
    status: SweepStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    samples: BTreeMap<SteppingMode, usize>,
    failures: Vec<SweepFailure>,
}

impl SweepRecord {
    /// Create a new record in Pending status.
    #[must_use]
    pub fn new(implementation: impl Into<String>, max_trajectories: u64) -> Self {
        Self {
            implementation: implementation.into(),
            max_trajectories,
            status: SweepStatus::Pending,
            started_at: None,
            ended_at: None,
            samples: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    /// Get the implementation name.
    #[must_use]
    pub fn implementation(&self) -> &str {
        &self.implementation
    }

    /// Get the sweep upper bound.
    #[must_use]
    pub const fn max_trajectories(&self) -> u64 {
        self.max_trajectories
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> SweepStatus {
        self.status
    }

    /// Get the start timestamp, if the sweep has started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp, if the sweep has completed.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Samples written per mode.
    #[must_use]
    pub const fn samples(&self) -> &BTreeMap<SteppingMode, usize> {
        &self.samples
    }

    /// Failed iterations.
    #[must_use]
    pub fn failures(&self) -> &[SweepFailure] {
        &self.failures
    }

    /// Transition from Pending to Running.
    pub fn start(&mut self) {
        self.status = SweepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Close the record and derive the final status from what happened.
    pub fn complete(
        &mut self,
        samples: BTreeMap<SteppingMode, usize>,
        failures: Vec<SweepFailure>,
        iterations: usize,
    ) {
        self.status = if failures.is_empty() {
            SweepStatus::Success
        } else if failures.len() == iterations {
            SweepStatus::Failed
        } else {
            SweepStatus::Partial
        };
        self.samples = samples;
        self.failures = failures;
        self.ended_at = Some(Utc::now());
    }
}
