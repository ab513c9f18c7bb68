use chrono::NaiveDate;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{PipelineError, Result};
use crate::processing::sanitize::EmptyColumnPolicy;
use crate::processing::window::MomentEstimator;

/// Tickers grouped under one asset type, e.g. `stocks` or `etfs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetGroup {
    pub asset_type: String,
    pub tickers: Vec<String>,
}

/// The set of assets downloaded by `fetch`.
///
/// Parsed from `type:TICKER,TICKER;type:TICKER`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Universe {
    groups: Vec<AssetGroup>,
}

impl Universe {
    /// `(asset_type, ticker)` pairs in declaration order.
    pub fn assets(&self) -> impl Iterator<Item = (&str, &str)> {
        self.groups.iter().flat_map(|group| {
            group
                .tickers
                .iter()
                .map(move |ticker| (group.asset_type.as_str(), ticker.as_str()))
        })
    }
}

impl Default for Universe {
    fn default() -> Self {
        let group = |asset_type: &str, tickers: &[&str]| AssetGroup {
            asset_type: asset_type.to_string(),
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
        };

        Self {
            groups: vec![
                group("stocks", &["FB", "AAPL", "AMZN", "NFLX", "GOOGL"]),
                group("etfs", &["SPY", "QQQ"]),
                group("indices", &["^GSPC", "^IXIC"]),
            ],
        }
    }
}

impl FromStr for Universe {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let mut groups = Vec::new();

        for chunk in s.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            let (asset_type, tickers) = chunk.split_once(':').ok_or_else(|| {
                PipelineError::Config(format!("asset group without ':' separator: {}", chunk))
            })?;

            let asset_type = asset_type.trim();
            let tickers: Vec<String> = tickers
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();

            if asset_type.is_empty() || tickers.is_empty() {
                return Err(PipelineError::Config(format!(
                    "asset group needs a type and at least one ticker: {}",
                    chunk
                )));
            }

            groups.push(AssetGroup {
                asset_type: asset_type.to_string(),
                tickers,
            });
        }

        if groups.is_empty() {
            return Err(PipelineError::Config("asset universe is empty".into()));
        }

        Ok(Self { groups })
    }
}

impl fmt::Display for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<String> = self
            .groups
            .iter()
            .map(|g| format!("{}:{}", g.asset_type, g.tickers.join(",")))
            .collect();
        f.write_str(&groups.join(";"))
    }
}

/// Runtime settings, read from the environment (and `.env`).
///
/// | Variable | Default |
/// |---|---|
/// | `DATA_DIR` | `./data` |
/// | `ASSET_UNIVERSE` | FAANG stocks, SPY/QQQ, ^GSPC/^IXIC |
/// | `START_DATE` | `2022-01-01` |
/// | `END_DATE` | `2023-01-01` (exclusive) |
/// | `EMPTY_COLUMN_POLICY` | `reject` |
/// | `MOMENT_ESTIMATOR` | `biased` |
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub universe: Universe,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub empty_column: EmptyColumnPolicy,
    pub moments: MomentEstimator,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            universe: Universe::default(),
            start: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap_or(NaiveDate::MIN),
            end: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or(NaiveDate::MAX),
            empty_column: EmptyColumnPolicy::default(),
            moments: MomentEstimator::default(),
        }
    }
}

impl Config {
    /// Reads the settings from process environment variables.
    ///
    /// # Errors
    /// Returns [`PipelineError::Config`] for unparsable values or an empty
    /// date range.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup, falling back to
    /// defaults for unset variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(universe) = lookup("ASSET_UNIVERSE") {
            config.universe = universe.parse()?;
        }
        if let Some(start) = lookup("START_DATE") {
            config.start = parse_date("START_DATE", &start)?;
        }
        if let Some(end) = lookup("END_DATE") {
            config.end = parse_date("END_DATE", &end)?;
        }
        if let Some(policy) = lookup("EMPTY_COLUMN_POLICY") {
            config.empty_column = policy.parse()?;
        }
        if let Some(estimator) = lookup("MOMENT_ESTIMATOR") {
            config.moments = estimator.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that the date range is non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.start >= self.end {
            return Err(PipelineError::Config(format!(
                "start date {} must precede end date {}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

fn parse_date(name: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| PipelineError::Config(format!("{} must be YYYY-MM-DD: {}", name, e)))
}
