use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use quant_features::config::{Config, Universe};
use quant_features::data::{AlphaVantageClient, DataLayout};
use quant_features::processing::{
    acquire, process_directory, EmptyColumnPolicy, MomentEstimator, Pipeline, RunReport,
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Daily OHLCV cleaning and feature engineering")]
struct Cli {
    /// Root directory holding `raw/` and `processed/`.
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Download daily bars for every asset into `raw/`.
    Fetch(FetchArgs),
    /// Clean every raw file and write indicator columns to `processed/`.
    Process(ProcessArgs),
    /// Fetch, then process.
    Run {
        #[command(flatten)]
        fetch: FetchArgs,
        #[command(flatten)]
        process: ProcessArgs,
    },
}

#[derive(Args)]
struct FetchArgs {
    /// Assets as `type:TICKER,TICKER;type:TICKER`.
    #[arg(long)]
    universe: Option<Universe>,
    /// First date to keep (inclusive).
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last date bound (exclusive).
    #[arg(long)]
    end: Option<NaiveDate>,
}

#[derive(Args)]
struct ProcessArgs {
    /// `reject` or `leave` for columns with no observations.
    #[arg(long)]
    empty_column: Option<EmptyColumnPolicy>,
    /// `biased` or `adjusted` skewness/kurtosis estimators.
    #[arg(long)]
    moments: Option<MomentEstimator>,
}

impl FetchArgs {
    fn apply(self, config: &mut Config) {
        if let Some(universe) = self.universe {
            config.universe = universe;
        }
        if let Some(start) = self.start {
            config.start = start;
        }
        if let Some(end) = self.end {
            config.end = end;
        }
    }
}

impl ProcessArgs {
    fn apply(self, config: &mut Config) {
        if let Some(policy) = self.empty_column {
            config.empty_column = policy;
        }
        if let Some(moments) = self.moments {
            config.moments = moments;
        }
    }
}

/// Downloads the configured universe into the raw directory.
///
/// # Errors
/// Returns an error if the API key is missing or the raw directory cannot be
/// created. Per-asset download failures are collected in the report instead.
async fn fetch(config: &Config, layout: &DataLayout) -> anyhow::Result<RunReport> {
    let source = AlphaVantageClient::from_env()?;
    info!(
        universe = %config.universe,
        start = %config.start,
        end = %config.end,
        "fetching daily bars"
    );
    let report = acquire(&source, &config.universe, layout, config.start, config.end)
        .await
        .context("acquisition failed")?;
    Ok(report)
}

/// Cleans and feature-engineers every raw file.
async fn process(config: &Config, layout: &DataLayout) -> anyhow::Result<RunReport> {
    let pipeline = Pipeline::from_config(config);
    let report = process_directory(pipeline, layout)
        .await
        .context("processing failed")?;
    Ok(report)
}

/// Logs a stage summary and returns the number of failed assets.
fn summarize(stage: &str, report: &RunReport) -> usize {
    info!(
        stage,
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "stage finished"
    );
    if report.is_success() {
        return 0;
    }
    for (asset, err) in &report.failed {
        error!(stage, asset = %asset, error = %err, "asset failed");
    }
    report.failed.len()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let failures = match cli.cmd {
        Cmd::Fetch(args) => {
            args.apply(&mut config);
            config.validate()?;
            let layout = DataLayout::new(&config.data_dir);
            summarize("fetch", &fetch(&config, &layout).await?)
        }
        Cmd::Process(args) => {
            args.apply(&mut config);
            let layout = DataLayout::new(&config.data_dir);
            summarize("process", &process(&config, &layout).await?)
        }
        Cmd::Run {
            fetch: fetch_args,
            process: process_args,
        } => {
            fetch_args.apply(&mut config);
            process_args.apply(&mut config);
            config.validate()?;
            let layout = DataLayout::new(&config.data_dir);
            let fetched = summarize("fetch", &fetch(&config, &layout).await?);
            fetched + summarize("process", &process(&config, &layout).await?)
        }
    };

    if failures > 0 {
        anyhow::bail!("{} asset(s) failed", failures);
    }

    Ok(())
}
