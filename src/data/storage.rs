use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::series::{Bar, PriceField, TimeSeries};
use crate::error::{PipelineError, Result};
use crate::processing::indicators::{FeatureSeries, Indicator};

/// On-disk layout: raw downloads under `raw/`, engineered files under `processed/`.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    /// Creates a layout rooted at `root`. Nothing is created on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory of downloaded files.
    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    /// Directory of cleaned and feature-engineered files.
    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    /// Raw file path for one asset.
    ///
    /// # Arguments
    /// * `asset_type`: Group name such as `stocks` or `etfs`
    /// * `ticker`: Provider symbol
    ///
    /// # Returns
    /// `<root>/raw/<asset_type>_<ticker>.csv`
    pub fn raw_path(&self, asset_type: &str, ticker: &str) -> PathBuf {
        self.raw_dir().join(raw_file_name(asset_type, ticker))
    }

    /// Path of the processed file matching a raw file.
    pub fn processed_path(&self, raw_path: &Path) -> Result<PathBuf> {
        let name = raw_path.file_name().ok_or_else(|| {
            PipelineError::Config(format!("not a file path: {}", raw_path.display()))
        })?;
        Ok(self.processed_dir().join(name))
    }

    /// Creates both directories if they do not exist.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(self.raw_dir())?;
        fs::create_dir_all(self.processed_dir())?;
        Ok(())
    }

    /// Every `.csv` file in the raw directory, sorted by name.
    pub fn raw_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(self.raw_dir())? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// File name shared by an asset's raw and processed files.
pub fn raw_file_name(asset_type: &str, ticker: &str) -> String {
    format!("{}_{}.csv", asset_type, ticker)
}

#[derive(Debug, Serialize, Deserialize)]
struct RawRecord {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Open")]
    open: Option<f64>,
    #[serde(rename = "High")]
    high: Option<f64>,
    #[serde(rename = "Low")]
    low: Option<f64>,
    #[serde(rename = "Close")]
    close: Option<f64>,
    #[serde(rename = "Volume")]
    volume: Option<f64>,
}

impl From<&Bar> for RawRecord {
    fn from(bar: &Bar) -> Self {
        Self {
            date: bar.date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }
}

/// Writes bars as `Date,Open,High,Low,Close,Volume`, absent values as empty cells.
pub fn write_raw(path: &Path, bars: &[Bar]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for bar in bars {
        writer.serialize(RawRecord::from(bar))?;
    }
    writer.flush()?;
    Ok(())
}

/// Loads a raw file as a series named after the file stem.
///
/// Empty cells and `NaN` are read as absent. Only the numeric columns named
/// in the header become part of the series; a column the file lacks is
/// recorded as missing rather than as fully absent data.
///
/// # Errors
/// Fails on unreadable files, malformed rows, or dates that are not
/// strictly increasing.
pub fn read_raw(path: &Path) -> Result<TimeSeries> {
    let symbol = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| PipelineError::Config(format!("bad file name: {}", path.display())))?;

    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let columns: Vec<PriceField> = PriceField::ALL
        .into_iter()
        .filter(|field| headers.iter().any(|h| h == field.column_name()))
        .collect();

    let mut bars = Vec::new();
    for record in reader.deserialize::<RawRecord>() {
        let r = record?;
        bars.push(Bar::new(r.date, r.open, r.high, r.low, r.close, r.volume));
    }

    TimeSeries::with_columns(symbol, &columns, bars)
}

/// Writes the sanitized columns followed by every indicator column.
/// Undefined indicator values are written as empty cells.
///
/// Only the numeric columns the series carried are written.
pub fn write_features(path: &Path, features: &FeatureSeries) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    let columns = features.columns();

    let header = std::iter::once("Date")
        .chain(columns.iter().map(|f| f.column_name()))
        .chain(Indicator::ALL.iter().map(|i| i.column_name()));
    writer.write_record(header)?;

    for row in features.rows() {
        let record = std::iter::once(row.bar.date.to_string())
            .chain(columns.iter().map(|&f| cell(row.bar.get(f))))
            .chain(Indicator::ALL.iter().map(|&i| cell(row.indicators.get(i))));
        writer.write_record(record)?;
    }

    writer.flush()?;
    Ok(())
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
