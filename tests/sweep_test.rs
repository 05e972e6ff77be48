//! Integration tests for the sweep driver
//!
//! Uses an in-process runner so every step, failure, and timing is scripted.

mod common;

use common::{config_with, fake_spec, FakeRunner};
use ode_bench::config::BenchConfig;
use ode_bench::runner::SolverRunner;
use ode_bench::sweep::{run_sweeps, SweepDriver, SweepRecord, SweepStatus, MANIFEST_FILE};
use ode_bench::timing::{SteppingMode, TimingLog};
use ode_bench::Error;
use std::fs;

const BOTH: [SteppingMode; 2] = [SteppingMode::Fixed, SteppingMode::Adaptive];

fn read_counts(config: &BenchConfig, name: &str, mode: SteppingMode) -> Vec<u64> {
    let spec = config.runner(name).unwrap();
    TimingLog::read(config.timing_path(spec, mode), name)
        .unwrap()
        .iter()
        .map(|s| s.trajectories())
        .collect()
}

#[test]
fn test_sweep_to_100_yields_8_and_32() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with(dir.path(), vec![fake_spec("fake", &BOTH)]);
    let runner = FakeRunner::new("fake", &BOTH);

    let report = SweepDriver::new(&config).run(&runner, 100).unwrap();

    assert!(report.is_success());
    assert_eq!(runner.calls(), vec![8, 32]);
    for mode in BOTH {
        assert_eq!(report.series(mode).unwrap().trajectory_counts(), vec![8, 32]);
        assert_eq!(read_counts(&config, "fake", mode), vec![8, 32]);
    }

    let spec = config.runner("fake").unwrap();
    let fixed = fs::read_to_string(config.timing_path(spec, SteppingMode::Fixed)).unwrap();
    assert_eq!(fixed, "8 4\n32 16\n");
    let adaptive = fs::read_to_string(config.timing_path(spec, SteppingMode::Adaptive)).unwrap();
    assert_eq!(adaptive, "8 12\n32 48\n");
}

#[test]
fn test_sweep_below_start_is_empty_not_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with(dir.path(), vec![fake_spec("fake", &BOTH)]);
    let runner = FakeRunner::new("fake", &BOTH);

    let report = SweepDriver::new(&config).run(&runner, 7).unwrap();

    assert!(report.is_success());
    assert!(runner.calls().is_empty());
    assert!(report.series(SteppingMode::Fixed).unwrap().is_empty());
    assert!(read_counts(&config, "fake", SteppingMode::Fixed).is_empty());
}

#[test]
fn test_rerun_truncates_previous_samples() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with(dir.path(), vec![fake_spec("fake", &BOTH)]);

    SweepDriver::new(&config)
        .run(&FakeRunner::new("fake", &BOTH), 512)
        .unwrap();
    assert_eq!(read_counts(&config, "fake", SteppingMode::Fixed), vec![8, 32, 128, 512]);

    SweepDriver::new(&config)
        .run(&FakeRunner::new("fake", &BOTH), 32)
        .unwrap();
    assert_eq!(read_counts(&config, "fake", SteppingMode::Fixed), vec![8, 32]);
    assert_eq!(read_counts(&config, "fake", SteppingMode::Adaptive), vec![8, 32]);
}

#[test]
fn test_rerun_removes_logs_of_modes_no_longer_swept() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with(dir.path(), vec![fake_spec("fake", &BOTH)]);
    let spec = config.runner("fake").unwrap();

    SweepDriver::new(&config)
        .run(&FakeRunner::new("fake", &BOTH), 32)
        .unwrap();
    assert!(config.timing_path(spec, SteppingMode::Adaptive).exists());

    SweepDriver::new(&config)
        .run(&FakeRunner::new("fake", &[SteppingMode::Fixed]), 32)
        .unwrap();
    assert!(!config.timing_path(spec, SteppingMode::Adaptive).exists());
}

#[test]
fn test_failed_iteration_appends_nothing_and_sweep_continues() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with(dir.path(), vec![fake_spec("fake", &BOTH)]);
    let runner = FakeRunner::new("fake", &BOTH).failing_at(&[32]);

    let report = SweepDriver::new(&config).run(&runner, 128).unwrap();

    assert_eq!(runner.calls(), vec![8, 32, 128]);
    assert!(!report.is_success());
    assert_eq!(report.record().status(), SweepStatus::Partial);
    assert_eq!(report.failures().len(), 1);
    assert_eq!(report.failures()[0].trajectories, 32);
    assert!(report.failures()[0].reason.contains("fake"));
    for mode in BOTH {
        assert_eq!(read_counts(&config, "fake", mode), vec![8, 128]);
    }
}

#[test]
fn test_missing_mode_in_output_fails_whole_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with(dir.path(), vec![fake_spec("fake", &BOTH)]);
    let runner = FakeRunner::new("fake", &BOTH).reporting_only(SteppingMode::Fixed);

    let report = SweepDriver::new(&config).run(&runner, 32).unwrap();

    assert_eq!(report.record().status(), SweepStatus::Failed);
    assert_eq!(report.failures().len(), 2);
    assert!(report.failures()[0].reason.contains("no timing reported for adaptive"));
    assert!(read_counts(&config, "fake", SteppingMode::Fixed).is_empty());
    assert!(read_counts(&config, "fake", SteppingMode::Adaptive).is_empty());
}

#[test]
fn test_manifest_written() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with(dir.path(), vec![fake_spec("fake", &BOTH)]);
    let spec = config.runner("fake").unwrap();

    SweepDriver::new(&config)
        .run(&FakeRunner::new("fake", &BOTH).failing_at(&[8]), 32)
        .unwrap();

    let path = config.implementation_dir(spec).join(MANIFEST_FILE);
    let record: SweepRecord = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(record.implementation(), "fake");
    assert_eq!(record.max_trajectories(), 32);
    assert_eq!(record.status(), SweepStatus::Partial);
    assert_eq!(record.samples()[&SteppingMode::Fixed], 1);
    assert!(record.ended_at().unwrap() >= record.started_at().unwrap());
}

#[test]
fn test_reference_artifact_check() {
    let dir = tempfile::tempdir().unwrap();
    let config = BenchConfig::builder()
        .data_dir(dir.path())
        .reference_trajectories(32)
        .runners(vec![fake_spec("fake", &BOTH)])
        .build()
        .unwrap();

    let report = SweepDriver::new(&config)
        .run(&FakeRunner::new("fake", &BOTH), 128)
        .unwrap();
    assert_eq!(report.missing_artifacts(), &[config.artifact_path("fake")]);
    assert!(report.is_success());

    let artifact = config.artifact_path("fake");
    let runner = FakeRunner::new("fake", &BOTH).writing_artifact(&artifact, 32);
    let report = SweepDriver::new(&config).run(&runner, 128).unwrap();
    assert!(report.missing_artifacts().is_empty());
}

#[test]
fn test_stale_reference_artifact_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = BenchConfig::builder()
        .data_dir(dir.path())
        .reference_trajectories(32)
        .runners(vec![fake_spec("fake", &BOTH)])
        .build()
        .unwrap();
    let artifact = config.artifact_path("fake");
    common::write_matrix(&artifact, &[vec![1.0, 0.0, 0.0], vec![2.0, 0.0, 0.0]]);

    // Left over from an earlier run; this runner never writes it
    let report = SweepDriver::new(&config)
        .run(&FakeRunner::new("fake", &BOTH), 128)
        .unwrap();
    assert_eq!(report.missing_artifacts(), &[artifact.clone()]);
    assert!(report.is_success());

    // Rewritten during the sweep, one row instead of two
    let runner = FakeRunner::new("fake", &BOTH).writing_artifact(&artifact, 32);
    let report = SweepDriver::new(&config).run(&runner, 128).unwrap();
    assert!(report.missing_artifacts().is_empty());
}

#[test]
fn test_unregistered_runner_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with(dir.path(), vec![fake_spec("fake", &BOTH)]);
    let err = SweepDriver::new(&config)
        .run(&FakeRunner::new("ghost", &BOTH), 32)
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_sibling_failures_do_not_abort_other_implementations() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with(
        dir.path(),
        vec![fake_spec("alpha", &BOTH), fake_spec("beta", &[SteppingMode::Fixed])],
    );
    let runners: Vec<Box<dyn SolverRunner>> = vec![
        Box::new(FakeRunner::new("alpha", &BOTH).failing_at(&[8, 32])),
        Box::new(FakeRunner::new("ghost", &BOTH)),
        Box::new(FakeRunner::new("beta", &[SteppingMode::Fixed])),
    ];

    for parallel in [false, true] {
        let outcomes = run_sweeps(&config, &runners, 32, parallel);
        let names: Vec<&str> = outcomes.iter().map(|o| o.implementation.as_str()).collect();
        assert_eq!(names, vec!["alpha", "ghost", "beta"]);
        assert!(!outcomes[0].is_success());
        assert!(outcomes[1].result.is_err());
        assert!(outcomes[2].is_success());
        assert_eq!(read_counts(&config, "beta", SteppingMode::Fixed), vec![8, 32]);
    }
}
