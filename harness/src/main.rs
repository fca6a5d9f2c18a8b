//! Stream Test Runner
//!
//! Thin command-line front end over the harness library:
//! - Loads the run configuration and applies command-line overrides
//! - Selects test cases by keyword and tag
//! - Runs them across one worker per stream
//! - Writes the execution report, also when interrupted

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use shared::ResourceId;

use harness::{Coordinator, Distribution, ExecutionReport, RunConfig, Selection, SkipMap, TestScenarios};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DistArg {
    Each,
    Load,
}

impl From<DistArg> for Distribution {
    fn from(arg: DistArg) -> Self {
        match arg {
            DistArg::Each => Distribution::Each,
            DistArg::Load => Distribution::Load,
        }
    }
}

/// `STREAM=TAG[,TAG...]`
#[derive(Debug, Clone)]
struct SkipGroup(Vec<String>);

impl FromStr for SkipGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (stream, tags) = s
            .split_once('=')
            .ok_or_else(|| format!("expected STREAM=TAG[,TAG...], got '{s}'"))?;
        let mut group = vec![stream.trim().to_string()];
        group.extend(tags.split(',').map(str::trim).filter(|t| !t.is_empty()).map(String::from));
        Ok(SkipGroup(group))
    }
}

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "Parallel stream test harness for the recording platform")]
struct Args {
    /// JSON run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Streams to run against, overriding the configuration
    #[arg(long, value_delimiter = ',')]
    resources: Vec<String>,

    /// Built-in suite to run
    #[arg(long, default_value = "loopback")]
    suite: String,

    /// Only run cases whose name contains this keyword
    #[arg(short = 'k')]
    keyword: Option<String>,

    /// Only run cases carrying this tag
    #[arg(short = 'm')]
    marker: Option<String>,

    /// Skip tags on one stream, e.g. `--skip s2=archive,copies`
    #[arg(long)]
    skip: Vec<SkipGroup>,

    /// Number of workers (defaults to one per stream)
    #[arg(long)]
    workers: Option<usize>,

    /// How cases are spread across workers
    #[arg(long, value_enum)]
    dist: Option<DistArg>,

    /// Report output path
    #[arg(long)]
    report: Option<PathBuf>,

    /// List the selected cases and exit
    #[arg(long)]
    list: bool,

    /// Enable verbose tracing output
    #[arg(long)]
    verbose: bool,
}

fn resolve_config(args: &Args) -> anyhow::Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };

    if !args.resources.is_empty() {
        config.resources = args
            .resources
            .iter()
            .map(|r| ResourceId::new(r.as_str()))
            .collect::<Result<_, _>>()?;
    }
    if let Some(workers) = args.workers {
        config.workers = Some(workers);
    }
    if let Some(dist) = args.dist {
        config.distribution = dist.into();
    }
    if let Some(report) = &args.report {
        config.report_path = report.clone();
    }
    if !args.skip.is_empty() {
        let groups: Vec<Vec<String>> = args.skip.iter().map(|g| g.0.clone()).collect();
        config.skip.merge(SkipMap::from_groups(&groups)?);
    }

    config.validate().context("invalid run configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let config = resolve_config(&args)?;
    shared::logging::init_tracing(Some(&config.log_level), args.verbose);

    let selection = Selection {
        keyword: args.keyword.clone(),
        marker: args.marker.clone(),
    };
    let cases = selection.apply(TestScenarios::suite(&args.suite)?);

    if args.list {
        for case in &cases {
            println!("{} [{}]", case.name(), case.tags().join(", "));
        }
        return Ok(ExitCode::SUCCESS);
    }

    tracing::info!("🧪 Starting stream test harness");
    tracing::info!(
        "Suite: {}, streams: {}, workers: {}",
        args.suite,
        config.resources.len(),
        config.worker_count()
    );

    let report_path = config.report_path.clone();
    let report = ExecutionReport::new();
    let coordinator = Coordinator::new(config, report.clone())?;

    let succeeded = tokio::select! {
        outcome = coordinator.run(cases) => {
            let outcome = outcome?;
            for failure in &outcome.worker_failures {
                tracing::error!("❌ {}", failure.error);
            }
            outcome.succeeded()
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("🛑 Interrupted, writing partial report");
            report.fail_running("run interrupted");
            false
        }
    };

    report
        .write_to(&report_path)
        .with_context(|| format!("writing report to {}", report_path.display()))?;

    if succeeded {
        tracing::info!("🏁 All test cases passed");
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!("❌ Run finished with failures");
        Ok(ExitCode::FAILURE)
    }
}
