use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nightly_bisect_core::{
    build_http_client, load_config, parse_bound_date, validate_config, BisectOutcome,
    BisectRequest, BisectionCandidate, Bisector, BuildIndexSource, BuildOverrides, BuildRunner,
    DownloadCache, HttpIndexSource, NightlyRunner, RunStatus,
};

/// Find the first nightly build where a test command starts failing.
///
/// The command is run once per tested build with the build's binary first on
/// PATH. Exit code 0 marks the build good, 1-127 bad, 125 untestable.
#[derive(Debug, Parser)]
#[command(name = "nightly-bisect", version, about)]
struct Cli {
    /// Known good date (YYYY-MM-DD); only later builds are tested
    #[arg(long, value_name = "DATE")]
    good: Option<String>,

    /// Known bad date (YYYY-MM-DD); only earlier builds are tested
    #[arg(long, value_name = "DATE")]
    bad: Option<String>,

    /// Target to test, in order of preference; may be repeated
    #[arg(long = "target", value_name = "TARGET")]
    targets: Vec<String>,

    /// Configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Download cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Extraction directory, kept after the run
    #[arg(long, value_name = "DIR")]
    scratch_dir: Option<PathBuf>,

    /// Keep index order for same-date builds missing from the ordering table
    #[arg(long)]
    lenient_ordering: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Test command and its arguments; runs the build's binary when omitted
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = load_config(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("Failed to load config from {:?}", path),
        None => "Failed to load config".to_string(),
    })?;

    if let Some(dir) = cli.cache_dir {
        config.cache.dir = dir;
    }
    if !cli.targets.is_empty() {
        config.bisect.targets = cli.targets;
    }
    if cli.lenient_ordering {
        config.bisect.strict_ordering = false;
    }

    validate_config(&config).context("Configuration validation failed")?;
    info!("Index: {}", config.index.url);
    info!("Cache directory: {:?}", config.cache.dir);
    info!("Targets: {}", config.bisect.targets.join(", "));

    let mut overrides =
        BuildOverrides::embedded().context("Embedded build overrides are invalid")?;
    if let Some(path) = &config.bisect.overrides_path {
        let extra = BuildOverrides::from_path(path)
            .with_context(|| format!("Failed to load build overrides from {:?}", path))?;
        overrides = overrides.merge(extra);
        info!("Merged build overrides from {:?}", path);
    }

    let client = build_http_client().context("Failed to create HTTP client")?;

    let index: Arc<dyn BuildIndexSource> = Arc::new(HttpIndexSource::new(
        client.clone(),
        config.index.url.clone(),
        Duration::from_secs(config.index.timeout_secs),
    ));
    let cache = DownloadCache::new(config.cache.dir.clone(), client);
    let runner: Arc<dyn BuildRunner> = Arc::new(NightlyRunner::new(config.runner.clone(), cache));
    info!("Using runner: {}", runner.name());

    let bisector = Bisector::new(index, runner, overrides)
        .with_range_callback(Arc::new(|low: usize, high: usize| {
            info!("Bisecting builds {} to {}", low, high);
        }))
        .with_result_callback(Arc::new(|candidate: &BisectionCandidate, status: &RunStatus| {
            info!("Tested {}: {}", candidate, status);
        }));

    let mut request = BisectRequest::new(config.bisect.targets.clone());
    request.good = cli.good.as_deref().map(parse_bound_date).transpose()?;
    request.bad = cli.bad.as_deref().map(parse_bound_date).transpose()?;
    request.scratch_dir = cli.scratch_dir;
    request.order_mode = config.bisect.order_mode();
    let mut command = cli.command.into_iter();
    request.command = command.next();
    request.args = command.collect();

    let outcome = bisector.run(&request).await?;
    print_outcome(&outcome);

    Ok(())
}

fn print_outcome(outcome: &BisectOutcome) {
    match &outcome.last_good {
        Some(candidate) => println!(
            "last good: {} ({}, {})",
            candidate.build.version, candidate.build.date, candidate.build.commit
        ),
        None => println!("last good: none found"),
    }
    match &outcome.first_bad {
        Some(candidate) => println!(
            "first bad: {} ({}, {})",
            candidate.build.version, candidate.build.date, candidate.build.commit
        ),
        None => println!("first bad: none found"),
    }
}
