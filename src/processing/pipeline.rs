use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::indicators::{FeatureSeries, IndicatorEngine};
use super::sanitize::Sanitizer;
use crate::config::{Config, Universe};
use crate::data::ingestion::MarketDataSource;
use crate::data::series::TimeSeries;
use crate::data::storage::{self, DataLayout};
use crate::error::{PipelineError, Result};

/// Sanitizer followed by indicator engine, applied to one asset at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pipeline {
    sanitizer: Sanitizer,
    engine: IndicatorEngine,
}

impl Pipeline {
    /// Combines a sanitizer and an indicator engine.
    pub fn new(sanitizer: Sanitizer, engine: IndicatorEngine) -> Self {
        Self { sanitizer, engine }
    }

    /// Builds the pipeline selected by the empty-column and moment settings.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Sanitizer::new(config.empty_column),
            IndicatorEngine::new(config.moments),
        )
    }

    /// Cleans `series` and derives its indicator columns.
    pub fn run(&self, series: TimeSeries) -> Result<FeatureSeries> {
        let series = self.sanitizer.sanitize(series)?;
        let series = self.sanitizer.treat_outliers(series);
        self.engine.compute(series)
    }

    /// Reads a raw file, runs the pipeline and writes the augmented file.
    /// Returns the number of rows written.
    pub fn process_file(&self, raw_path: &Path, processed_path: &Path) -> Result<usize> {
        let series = storage::read_raw(raw_path)?;
        let features = self.run(series)?;
        storage::write_features(processed_path, &features)?;
        Ok(features.len())
    }
}

/// Outcome of a batch over many assets. Every asset ends up in exactly one list.
#[derive(Debug, Default)]
pub struct RunReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, PipelineError)>,
}

impl RunReport {
    /// True when no asset failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, name: String, result: Result<usize>) {
        match result {
            Ok(rows) => {
                info!(asset = %name, rows, "done");
                self.succeeded.push(name);
            }
            Err(e) => {
                warn!(asset = %name, error = %e, "failed");
                self.failed.push((name, e));
            }
        }
    }
}

/// Downloads every asset in `universe` into the raw directory.
///
/// Assets are fetched one after another to stay within provider rate limits.
/// A failed download is recorded and the remaining assets are still fetched.
/// A download with no bars counts as failed and writes no file.
pub async fn acquire(
    source: &dyn MarketDataSource,
    universe: &Universe,
    layout: &DataLayout,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<RunReport> {
    layout.ensure()?;
    let mut report = RunReport::default();

    for (asset_type, ticker) in universe.assets() {
        info!(asset_type, ticker, "downloading");
        let path = layout.raw_path(asset_type, ticker);

        let result = match source.fetch_daily(ticker, start, end).await {
            Ok(bars) if bars.is_empty() => Err(PipelineError::Provider(format!(
                "no market data for {} between {} and {}",
                ticker, start, end
            ))),
            Ok(bars) => storage::write_raw(&path, &bars).map(|_| bars.len()),
            Err(e) => Err(e),
        };
        report.record(storage::raw_file_name(asset_type, ticker), result);
    }

    Ok(report)
}

/// Runs `pipeline` over every raw file, one blocking task per asset.
///
/// Assets share no state, so they are processed concurrently. Results are
/// reported in file name order.
pub async fn process_directory(pipeline: Pipeline, layout: &DataLayout) -> Result<RunReport> {
    layout.ensure()?;
    let files = layout.raw_files()?;
    info!(count = files.len(), dir = %layout.raw_dir().display(), "processing raw files");

    let mut handles = Vec::with_capacity(files.len());
    for raw_path in files {
        let processed_path: PathBuf = layout.processed_path(&raw_path)?;
        let name = raw_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let handle = tokio::task::spawn_blocking(move || {
            pipeline.process_file(&raw_path, &processed_path)
        });
        handles.push((name, handle));
    }

    let mut report = RunReport::default();
    for (name, handle) in handles {
        let result = handle
            .await
            .unwrap_or_else(|e| Err(PipelineError::Worker(e.to_string())));
        report.record(name, result);
    }

    Ok(report)
}
