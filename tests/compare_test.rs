//! Integration tests for the cross-implementation comparator

mod common;

use common::write_matrix;
use ode_bench::compare::{
    compare, CompareOptions, Comparator, ComparisonSuite, PairOutcome, Tolerance, Verdict,
    DEFAULT_ATOL,
};
use ode_bench::config::BenchConfig;
use ode_bench::matrix::StateMatrix;
use ode_bench::report::{MarkdownTable, PairStatus, SuiteSummary, TextReport};
use ode_bench::Error;

#[allow(clippy::cast_precision_loss)]
fn lorenz_like(rows: usize) -> StateMatrix {
    let data: Vec<Vec<f64>> = (0..rows)
        .map(|i| {
            let t = i as f64;
            vec![t.sin() * 10.0, t.cos() * 12.0, 20.0 + t * 1e-3]
        })
        .collect();
    StateMatrix::from_rows(&data).unwrap()
}

fn single_row(values: &[f64]) -> StateMatrix {
    StateMatrix::from_rows(&[values.to_vec()]).unwrap()
}

#[test]
fn test_identical_reference_ensembles_pass() {
    let a = lorenz_like(32_768);
    let b = a.clone();

    let result = compare("cubie_adaptive", &a, "jax", &b, &CompareOptions::default()).unwrap();

    assert!(result.within_tolerance());
    assert_eq!(result.shape(), (32_768, 3));
    assert_eq!(result.total_elements(), 98_304);
    assert!(result.abs_stats().max.abs() < f64::EPSILON);
    assert!(result.rel_stats().max.abs() < f64::EPSILON);
    assert!((result.percent_close() - 100.0).abs() < f64::EPSILON);
    assert_eq!(result.abs_per_column().len(), 3);
}

#[test]
fn test_small_drift_in_one_state_fails_and_ranks_first() {
    let a = single_row(&[1.0, 2.0, 3.0]);
    let b = single_row(&[1.00001, 2.00002, 3.00009]);

    let result = compare("jax", &a, "pytorch", &b, &CompareOptions::default()).unwrap();

    assert!(!result.within_tolerance());
    assert_eq!(result.num_close(), 2);
    let worst = &result.worst()[0];
    assert_eq!((worst.row, worst.col), (0, 2));
    assert!(!worst.within_tolerance);
    assert!(result.worst()[1..].iter().all(|m| m.within_tolerance));
}

#[test]
fn test_absolute_tolerance_boundary_against_zero() {
    let zero = single_row(&[0.0]);
    let options = CompareOptions::default();

    let at = compare("a", &single_row(&[DEFAULT_ATOL]), "b", &zero, &options).unwrap();
    assert!(at.within_tolerance());

    let over = compare("a", &single_row(&[DEFAULT_ATOL * 1.0001]), "b", &zero, &options).unwrap();
    assert!(!over.within_tolerance());
}

#[test]
fn test_nan_never_agrees() {
    let a = single_row(&[f64::NAN, 1.0]);
    let b = single_row(&[f64::NAN, 1.0]);

    let result = compare("a", &a, "b", &b, &CompareOptions::default()).unwrap();

    assert!(!result.within_tolerance());
    assert_eq!(result.abs_stats().non_finite, 1);
    assert_eq!(result.abs_stats().count, 1);
    let worst = &result.worst()[0];
    assert_eq!((worst.row, worst.col), (0, 0));
}

#[test]
fn test_stats_are_symmetric() {
    let a = single_row(&[1.0, -2.0, 3.5, 0.0]);
    let b = single_row(&[1.1, -2.2, 3.0, 1e-9]);
    let options = CompareOptions::default();

    let ab = compare("a", &a, "b", &b, &options).unwrap();
    let ba = compare("b", &b, "a", &a, &options).unwrap();

    assert_eq!(ab.abs_stats(), ba.abs_stats());
    assert_eq!(ab.rel_stats(), ba.rel_stats());
    assert_eq!(ab.num_close(), ba.num_close());
}

#[test]
fn test_shape_mismatch_is_error() {
    let a = StateMatrix::new(100, 3, vec![0.0; 300]).unwrap();
    let b = StateMatrix::new(100, 2, vec![0.0; 200]).unwrap();

    let err = compare("cubie_fixed", &a, "mpgos", &b, &CompareOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        Error::ShapeMismatch { left_shape: (100, 3), right_shape: (100, 2), .. }
    ));
}

#[test]
fn test_suite_excludes_mismatched_pair_from_counts() {
    let a = StateMatrix::new(100, 3, vec![1.0; 300]).unwrap();
    let b = StateMatrix::new(100, 3, vec![1.0; 300]).unwrap();
    let c = StateMatrix::new(100, 2, vec![1.0; 200]).unwrap();

    let suite = ComparisonSuite::run(
        vec![
            ("mpgos".to_string(), c),
            ("jax".to_string(), b),
            ("cubie_fixed".to_string(), a),
        ],
        Vec::new(),
        &CompareOptions::default(),
    )
    .unwrap();

    assert_eq!(suite.outcomes().len(), 3);
    assert_eq!(suite.passed(), 1);
    assert_eq!(suite.failed(), 0);
    assert_eq!(suite.incompatible(), 2);
    assert_eq!(suite.verdict(), Verdict::Incomplete);
    assert!(matches!(
        suite.pair("mpgos", "jax"),
        Some(PairOutcome::Incompatible { .. })
    ));
    assert!(matches!(
        suite.pair("jax", "cubie_fixed"),
        Some(PairOutcome::Compared(_))
    ));
}

#[test]
fn test_tolerance_failure_takes_precedence_over_incomplete() {
    let suite = ComparisonSuite::run(
        vec![
            ("a".to_string(), single_row(&[1.0, 2.0])),
            ("b".to_string(), single_row(&[1.5, 2.0])),
            ("c".to_string(), single_row(&[1.0])),
        ],
        Vec::new(),
        &CompareOptions::default(),
    )
    .unwrap();

    assert_eq!(suite.failed(), 1);
    assert_eq!(suite.incompatible(), 2);
    assert_eq!(suite.verdict(), Verdict::ToleranceFailure);
}

#[test]
fn test_fewer_than_two_datasets_is_incomplete() {
    let suite = ComparisonSuite::run(
        vec![("jax".to_string(), single_row(&[1.0]))],
        Vec::new(),
        &CompareOptions::default(),
    )
    .unwrap();
    assert!(suite.outcomes().is_empty());
    assert_eq!(suite.verdict(), Verdict::Incomplete);
}

#[test]
fn test_duplicate_names_rejected() {
    let err = ComparisonSuite::run(
        vec![
            ("jax".to_string(), single_row(&[1.0])),
            ("jax".to_string(), single_row(&[1.0])),
        ],
        Vec::new(),
        &CompareOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[test]
fn test_comparator_skips_missing_and_malformed_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let config = BenchConfig::builder().data_dir(dir.path()).build().unwrap();
    let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
    write_matrix(&config.artifact_path("cubie_adaptive"), &rows);
    write_matrix(&config.artifact_path("jax"), &rows);
    std::fs::write(config.artifact_path("pytorch"), "1.0,2.0,3.0\n4.0,oops,6.0\n").unwrap();

    let comparator = Comparator::new(&config, CompareOptions::default());
    let suite = comparator.run().unwrap();

    let names: Vec<&str> = suite
        .implementations()
        .iter()
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(names, vec!["cubie_adaptive", "jax"]);
    assert_eq!(suite.verdict(), Verdict::Pass);

    let pytorch = suite
        .unavailable()
        .iter()
        .find(|u| u.implementation == "pytorch")
        .unwrap();
    assert!(matches!(pytorch.error, Error::Parse { line: 2, .. }));
    let mpgos = suite
        .unavailable()
        .iter()
        .find(|u| u.implementation == "mpgos")
        .unwrap();
    assert!(matches!(mpgos.error, Error::MissingArtifact { .. }));
}

#[test]
fn test_comparator_load_selected_names() {
    let dir = tempfile::tempdir().unwrap();
    let config = BenchConfig::builder().data_dir(dir.path()).build().unwrap();
    write_matrix(&config.artifact_path("jax"), &[vec![1.0, 2.0, 3.0]]);
    write_matrix(&config.artifact_path("mpgos"), &[vec![1.0, 2.0, 3.0 + 1e-3]]);

    let comparator = Comparator::new(&config, CompareOptions::default());
    let (loaded, unavailable) = comparator.load(&["jax".to_string(), "mpgos".to_string()]);
    assert_eq!(loaded.len(), 2);
    assert!(unavailable.is_empty());

    let suite = ComparisonSuite::run(loaded, unavailable, &CompareOptions::default()).unwrap();
    assert_eq!(suite.verdict(), Verdict::ToleranceFailure);
}

#[test]
fn test_reports_written_for_mixed_suite() {
    let dir = tempfile::tempdir().unwrap();
    let tolerance = Tolerance::default();
    let suite = ComparisonSuite::run(
        vec![
            ("a".to_string(), single_row(&[1.0, 2.0, 3.0])),
            ("b".to_string(), single_row(&[1.0, 2.0, 3.5])),
            ("c".to_string(), single_row(&[1.0, 2.0])),
        ],
        Vec::new(),
        &CompareOptions::default(),
    )
    .unwrap();

    let text = TextReport::new(&suite, tolerance).to_string();
    assert!(text.contains("Comparing a vs b"));
    assert!(text.contains("allclose(rtol=0.00001, atol=0.00000001): FAIL"));
    assert!(text.contains("(outside tolerance)"));
    assert!(text.contains("Pair excluded from pass/fail statistics."));
    assert!(text.contains("FAIL: some implementations disagree beyond tolerance"));

    let md_path = dir.path().join("pairwise_comparisons.md");
    MarkdownTable::new(&suite).write_to(&md_path).unwrap();
    let md = std::fs::read_to_string(&md_path).unwrap();
    assert!(md.contains("| |a|b|c|"));
    assert!(md.contains("N/A"));
    assert!(md.contains("%Close: 66.7%"));

    let json_path = dir.path().join("summary.json");
    SuiteSummary::from_suite(&suite, tolerance)
        .write_to(&json_path)
        .unwrap();
    let summary: SuiteSummary =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.incompatible, 2);
    assert_eq!(summary.pairs[0].status, PairStatus::Fail);
    assert_eq!(summary.pairs[1].status, PairStatus::ShapeMismatch);
}
