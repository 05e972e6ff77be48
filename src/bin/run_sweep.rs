//! `run-sweep`: benchmark one or more solver implementations over a
//! geometric sweep of trajectory counts.
//!
//! Exit code is 0 only if every iteration of every requested implementation
//! produced its timing samples.

use anyhow::{bail, Context};
use clap::Parser;
use ode_bench::config::BenchConfig;
use ode_bench::model::Model;
use ode_bench::runner::{CommandRunner, SolverRunner};
use ode_bench::sweep::{run_sweeps, SweepOutcome};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about = "Sweep ODE ensemble solvers over trajectory counts", long_about = None)]
struct Args {
    /// Implementation(s) to sweep (repeatable)
    #[arg(long = "implementation", short = 'i', required_unless_present = "all")]
    implementations: Vec<String>,

    /// Sweep every registered implementation
    #[arg(long, conflicts_with = "implementations")]
    all: bool,

    /// Upper bound of the sweep (inclusive)
    #[arg(long, short = 'n')]
    max_trajectories: u64,

    /// Timing output root
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// State artifact directory (default: <data-dir>/numerical)
    #[arg(long)]
    numerical_dir: Option<PathBuf>,

    /// JSON runner registry replacing the built-in runners
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model passed to the runners
    #[arg(long, default_value = "lorenz")]
    model: Model,

    /// Trajectory count at which runners persist final states
    #[arg(long)]
    reference_trajectories: Option<u64>,

    /// Sweep the selected implementations concurrently
    #[arg(long)]
    parallel: bool,
}

fn build_config(args: &Args) -> anyhow::Result<BenchConfig> {
    let mut builder = BenchConfig::builder()
        .data_dir(&args.data_dir)
        .model(args.model);
    if let Some(dir) = &args.numerical_dir {
        builder = builder.numerical_dir(dir);
    }
    if let Some(n) = args.reference_trajectories {
        builder = builder.reference_trajectories(n);
    }
    if let Some(path) = &args.config {
        builder = builder.registry_file(path)?;
    }
    Ok(builder.build()?)
}

fn print_summary(outcomes: &[SweepOutcome]) {
    println!("═══════════════════════════════════════════════════════════");
    for outcome in outcomes {
        match &outcome.result {
            Ok(report) => {
                let counts: Vec<String> = report
                    .record()
                    .samples()
                    .iter()
                    .map(|(mode, n)| format!("{mode}={n}"))
                    .collect();
                println!(
                    "  {:<10} {:?}  samples: {}",
                    outcome.implementation,
                    report.record().status(),
                    counts.join(", ")
                );
                for failure in report.failures() {
                    println!("      failed at {}: {}", failure.trajectories, failure.reason);
                }
                for path in report.missing_artifacts() {
                    println!("      missing state artifact: {}", path.display());
                }
            }
            Err(e) => println!("  {:<10} ABORTED  {e}", outcome.implementation),
        }
    }
    println!("═══════════════════════════════════════════════════════════");
}

fn run(args: &Args) -> anyhow::Result<bool> {
    let config = build_config(args).context("failed to load configuration")?;

    let names: Vec<String> = if args.all {
        config.runners().iter().map(|r| r.name.clone()).collect()
    } else {
        args.implementations.clone()
    };
    if names.is_empty() {
        bail!("no implementations to sweep");
    }

    let mut runners: Vec<Box<dyn SolverRunner>> = Vec::with_capacity(names.len());
    for name in &names {
        let spec = config.runner(name)?;
        runners.push(Box::new(CommandRunner::new(&config, spec)));
    }

    let outcomes = run_sweeps(&config, &runners, args.max_trajectories, args.parallel);
    print_summary(&outcomes);
    Ok(outcomes.iter().all(SweepOutcome::is_success))
}

fn main() -> ExitCode {
    ode_bench::init_logging();
    let args = Args::parse();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
