//! Cleaning and feature engineering for daily OHLCV series.
//!
//! A raw series goes through the [`processing::sanitize::Sanitizer`] and then
//! the [`processing::indicators::IndicatorEngine`], which appends moving
//! averages, MACD, RSI, rate of change, Bollinger Bands, volatility,
//! skewness and kurtosis. [`data`] holds the acquisition and CSV adapters
//! around that core.

pub mod config;
pub mod data;
pub mod error;
pub mod processing;

pub use error::{PipelineError, Result};
