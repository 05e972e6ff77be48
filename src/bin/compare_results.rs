//! `compare-results`: pairwise numerical comparison of every available
//! implementation's final-state artifact.
//!
//! The full report always goes to stdout, the pairwise table to
//! `pairwise_comparisons.md` and the JSON summary to
//! `comparison_summary.json` (both paths configurable). Exit codes:
//! - 0: every pair within tolerance
//! - 1: at least one pair outside tolerance
//! - 2: shape mismatch, fewer than two datasets, or a fatal error

use anyhow::Context;
use clap::Parser;
use ode_bench::compare::{
    CompareOptions, Comparator, ComparisonSuite, Tolerance, Verdict, DEFAULT_ATOL, DEFAULT_RTOL,
    DEFAULT_TOP_K, REL_EPSILON,
};
use ode_bench::config::BenchConfig;
use ode_bench::model::Model;
use ode_bench::report::{MarkdownTable, SuiteSummary, TextReport, DEFAULT_SUMMARY_FILE};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Compare final ODE states across implementations", long_about = None)]
struct Args {
    /// Relative tolerance
    #[arg(long, default_value_t = DEFAULT_RTOL)]
    rtol: f64,

    /// Absolute tolerance
    #[arg(long, default_value_t = DEFAULT_ATOL)]
    atol: f64,

    /// Number of worst mismatches listed per pair
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Timing output root
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// State artifact directory (default: <data-dir>/numerical)
    #[arg(long)]
    numerical_dir: Option<PathBuf>,

    /// JSON runner registry replacing the built-in runners
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model the artifacts were produced with (labels mismatching trajectories)
    #[arg(long, default_value = "lorenz")]
    model: Model,

    /// Compare only these artifacts instead of every configured one
    #[arg(long = "implementation", short = 'i')]
    implementations: Vec<String>,

    /// Where to write the markdown pairwise table
    #[arg(long, default_value = "pairwise_comparisons.md")]
    markdown: PathBuf,

    /// Where to write the JSON summary
    #[arg(long, default_value = DEFAULT_SUMMARY_FILE)]
    json: PathBuf,
}

fn build_config(args: &Args) -> anyhow::Result<BenchConfig> {
    let mut builder = BenchConfig::builder()
        .data_dir(&args.data_dir)
        .model(args.model);
    if let Some(dir) = &args.numerical_dir {
        builder = builder.numerical_dir(dir);
    }
    if let Some(path) = &args.config {
        builder = builder.registry_file(path)?;
    }
    Ok(builder.build()?)
}

fn run(args: &Args) -> anyhow::Result<Verdict> {
    let config = build_config(args).context("failed to load configuration")?;
    let tolerance = Tolerance::new(args.rtol, args.atol)?;
    let options = CompareOptions {
        tolerance,
        top_k: args.top_k,
        epsilon: REL_EPSILON,
    };

    info!(numerical_dir = %config.numerical_dir().display(), "looking for state artifacts");
    let comparator = Comparator::new(&config, options);
    let suite = if args.implementations.is_empty() {
        comparator.run()?
    } else {
        let (loaded, unavailable) = comparator.load(&args.implementations);
        ComparisonSuite::run(loaded, unavailable, &options)?
    };

    print!("{}", TextReport::new(&suite, tolerance).with_model(config.model()));

    MarkdownTable::new(&suite)
        .write_to(&args.markdown)
        .with_context(|| format!("failed to write {}", args.markdown.display()))?;
    println!("\nWrote pairwise comparison table to: {}", args.markdown.display());

    SuiteSummary::from_suite(&suite, tolerance)
        .write_to(&args.json)
        .with_context(|| format!("failed to write {}", args.json.display()))?;
    println!("Wrote JSON summary to: {}", args.json.display());

    Ok(suite.verdict())
}

fn main() -> ExitCode {
    ode_bench::init_logging();
    let args = Args::parse();

    match run(&args) {
        Ok(Verdict::Pass) => ExitCode::SUCCESS,
        Ok(Verdict::ToleranceFailure) => ExitCode::from(1),
        Ok(Verdict::Incomplete) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
