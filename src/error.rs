use chrono::NaiveDate;
use thiserror::Error;

use crate::data::series::PriceField;

/// Errors produced by the feature pipeline and its adapters.
///
/// Arithmetic edge cases (short history, zero denominators) are never errors;
/// they surface as undefined indicator values instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Two consecutive bars share a date.
    #[error("duplicate date {date} at position {index}")]
    DuplicateDate { index: usize, date: NaiveDate },

    /// A bar is dated before its predecessor.
    #[error("date {current} at position {index} precedes {previous}")]
    Unsorted {
        index: usize,
        previous: NaiveDate,
        current: NaiveDate,
    },

    /// A column has no present value anywhere in the series.
    #[error("column {field} has no observed values")]
    EmptyColumn { field: PriceField },

    /// The indicator engine was handed a bar without a close.
    #[error("close missing on {date}; series must be sanitized first")]
    MissingClose { date: NaiveDate },

    /// The market data provider returned an error or an unusable payload.
    #[error("provider error: {0}")]
    Provider(String),

    /// A per-asset worker stopped before producing a result.
    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("CSV error")]
    Csv(#[from] csv::Error),

    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
