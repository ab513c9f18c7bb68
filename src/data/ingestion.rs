use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::env;
use tracing::{debug, warn};

use super::series::Bar;
use crate::error::{PipelineError, Result};

const ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co/query";
const TIME_SERIES_KEY: &str = "Time Series (Daily)";

/// A provider of raw daily bars for a single symbol.
///
/// Implementations return bars sorted by ascending date. Individual fields
/// may be absent when the provider has no observation for them.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetches daily bars dated in `[start, end)`.
    async fn fetch_daily(&self, symbol: &str, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<Bar>>;
}

/// Fetches daily equity, ETF and index bars from the Alpha Vantage REST API.
pub struct AlphaVantageClient {
    api_key: String,
    client: reqwest::Client,
}

impl AlphaVantageClient {
    /// Creates a client authenticated with `api_key`.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Creates a client with the key from `ALPHA_VANTAGE_API_KEY`.
    ///
    /// # Errors
    /// Returns [`PipelineError::Config`] if the variable is not set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Creates a client with the key returned by `lookup("ALPHA_VANTAGE_API_KEY")`.
    ///
    /// # Errors
    /// Returns [`PipelineError::Config`] if the key is missing or blank.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("ALPHA_VANTAGE_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Config("ALPHA_VANTAGE_API_KEY must be set in environment".into())
            })?;
        Ok(Self::new(api_key))
    }
}

#[async_trait]
impl MarketDataSource for AlphaVantageClient {
    async fn fetch_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>> {
        debug!(symbol, %start, %end, "requesting daily series");

        let response = self
            .client
            .get(ALPHA_VANTAGE_URL)
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", symbol),
                ("outputsize", "full"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        parse_daily_response(&response, start, end)
    }
}

/// Converts an Alpha Vantage daily payload into bars dated in `[start, end)`,
/// sorted by ascending date.
///
/// A missing OHLCV key leaves that field absent. A value that is present but
/// not numeric is rejected.
///
/// # Errors
/// Returns [`PipelineError::Provider`] for provider error and rate-limit
/// messages, malformed payloads, and payloads with no bar in the range.
pub fn parse_daily_response(response: &Value, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>> {
    if let Some(message) = response.get("Error Message") {
        return Err(PipelineError::Provider(format!(
            "Alpha Vantage API error: {}",
            message.as_str().unwrap_or("unknown error")
        )));
    }

    let Some(time_series) = response.get(TIME_SERIES_KEY) else {
        if let Some(note) = response.get("Note").or_else(|| response.get("Information")) {
            return Err(PipelineError::Provider(format!(
                "API rate limit: {}",
                note.as_str().unwrap_or("unknown rate limit message")
            )));
        }
        return Err(PipelineError::Provider(
            "time series data not found in response".into(),
        ));
    };

    if let Some(note) = response.get("Note") {
        warn!(note = note.as_str().unwrap_or(""), "Alpha Vantage API note");
    }

    let time_series = time_series.as_object().ok_or_else(|| {
        PipelineError::Provider("invalid response format: time series is not an object".into())
    })?;

    let mut bars = Vec::new();
    for (date_str, entry) in time_series {
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
            PipelineError::Provider(format!("invalid date {}: {}", date_str, e))
        })?;
        if date < start || date >= end {
            continue;
        }

        let entry = entry.as_object().ok_or_else(|| {
            PipelineError::Provider(format!("invalid data format for {}", date_str))
        })?;

        bars.push(Bar::new(
            date,
            field(entry, "1. open", date)?,
            field(entry, "2. high", date)?,
            field(entry, "3. low", date)?,
            field(entry, "4. close", date)?,
            field(entry, "5. volume", date)?,
        ));
    }

    if bars.is_empty() {
        return Err(PipelineError::Provider(format!(
            "no market data found between {} and {}",
            start, end
        )));
    }

    bars.sort_by_key(|bar| bar.date);
    Ok(bars)
}

fn field(entry: &Map<String, Value>, key: &str, date: NaiveDate) -> Result<Option<f64>> {
    let value = match entry.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };

    let parsed = match value {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };

    parsed.map(Some).ok_or_else(|| {
        PipelineError::Provider(format!("{} on {} is not numeric: {}", key, date, value))
    })
}
