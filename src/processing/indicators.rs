use tracing::debug;

use super::window::{finite, MomentEstimator, RollingWindow};
use crate::data::series::{Bar, PriceField, TimeSeries};
use crate::error::{PipelineError, Result};

/// The derived columns appended to every bar, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    Ma7,
    Ma21,
    Ema12,
    Ema26,
    Macd,
    Rsi,
    Roc,
    Sma20,
    Std20,
    UpperBollinger,
    LowerBollinger,
    Volatility,
    Skewness,
    Kurtosis,
}

impl Indicator {
    /// Every indicator, in output column order.
    pub const ALL: [Indicator; 14] = [
        Indicator::Ma7,
        Indicator::Ma21,
        Indicator::Ema12,
        Indicator::Ema26,
        Indicator::Macd,
        Indicator::Rsi,
        Indicator::Roc,
        Indicator::Sma20,
        Indicator::Std20,
        Indicator::UpperBollinger,
        Indicator::LowerBollinger,
        Indicator::Volatility,
        Indicator::Skewness,
        Indicator::Kurtosis,
    ];

    /// Header used for this indicator in processed files.
    pub fn column_name(self) -> &'static str {
        match self {
            Indicator::Ma7 => "7_day_MA",
            Indicator::Ma21 => "21_day_MA",
            Indicator::Ema12 => "12_day_EMA",
            Indicator::Ema26 => "26_day_EMA",
            Indicator::Macd => "MACD",
            Indicator::Rsi => "RSI",
            Indicator::Roc => "ROC",
            Indicator::Sma20 => "20_day_SMA",
            Indicator::Std20 => "20_day_STD",
            Indicator::UpperBollinger => "Upper_Bollinger",
            Indicator::LowerBollinger => "Lower_Bollinger",
            Indicator::Volatility => "Volatility",
            Indicator::Skewness => "Skewness",
            Indicator::Kurtosis => "Kurtosis",
        }
    }
}

/// Indicator values for one bar. `None` marks a value that is not computable
/// at this position (short history or a zero denominator).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorValues {
    pub ma_7: Option<f64>,
    pub ma_21: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub macd: Option<f64>,
    pub rsi_14: Option<f64>,
    pub roc_9: Option<f64>,
    pub sma_20: Option<f64>,
    pub std_20: Option<f64>,
    pub upper_bollinger: Option<f64>,
    pub lower_bollinger: Option<f64>,
    pub volatility_7: Option<f64>,
    pub skewness_21: Option<f64>,
    pub kurtosis_21: Option<f64>,
}

impl IndicatorValues {
    /// Value of one indicator at this bar.
    pub fn get(&self, indicator: Indicator) -> Option<f64> {
        match indicator {
            Indicator::Ma7 => self.ma_7,
            Indicator::Ma21 => self.ma_21,
            Indicator::Ema12 => self.ema_12,
            Indicator::Ema26 => self.ema_26,
            Indicator::Macd => self.macd,
            Indicator::Rsi => self.rsi_14,
            Indicator::Roc => self.roc_9,
            Indicator::Sma20 => self.sma_20,
            Indicator::Std20 => self.std_20,
            Indicator::UpperBollinger => self.upper_bollinger,
            Indicator::LowerBollinger => self.lower_bollinger,
            Indicator::Volatility => self.volatility_7,
            Indicator::Skewness => self.skewness_21,
            Indicator::Kurtosis => self.kurtosis_21,
        }
    }
}

/// A sanitized bar together with its derived columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub bar: Bar,
    pub indicators: IndicatorValues,
}

/// The augmented series handed to persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSeries {
    symbol: String,
    columns: Vec<PriceField>,
    rows: Vec<FeatureRow>,
}

impl FeatureSeries {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Numeric columns carried over from the sanitized series.
    pub fn columns(&self) -> &[PriceField] {
        &self.columns
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One indicator as a column, in series order.
    pub fn column(&self, indicator: Indicator) -> Vec<Option<f64>> {
        self.rows
            .iter()
            .map(|row| row.indicators.get(indicator))
            .collect()
    }
}

/// Derives the fixed indicator set from the close prices of a sanitized series.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorEngine {
    moments: MomentEstimator,
}

impl IndicatorEngine {
    /// Creates an engine using `moments` for skewness and kurtosis.
    pub fn new(moments: MomentEstimator) -> Self {
        Self { moments }
    }

    /// Computes every indicator column for `series`.
    ///
    /// # Errors
    /// Returns [`PipelineError::MissingClose`] if any bar lacks a close; the
    /// series must go through the sanitizer first.
    pub fn compute(&self, series: TimeSeries) -> Result<FeatureSeries> {
        let (symbol, columns, bars) = series.into_parts();

        let closes = bars
            .iter()
            .map(|bar| bar.close.ok_or(PipelineError::MissingClose { date: bar.date }))
            .collect::<Result<Vec<f64>>>()?;

        let ma_7 = rolling_mean(&closes, 7);
        let ma_21 = rolling_mean(&closes, 21);
        let ema_12 = ema(&closes, 12);
        let ema_26 = ema(&closes, 26);
        let rsi_14 = rsi(&closes, 14);
        let roc_9 = rate_of_change(&closes, 9);
        let sma_20 = rolling_mean(&closes, 20);
        let std_20 = rolling_std(&closes, 20);
        let volatility_7 = rolling_std(&closes, 7);
        let skewness_21 = rolling_skewness(&closes, 21, self.moments);
        let kurtosis_21 = rolling_kurtosis(&closes, 21, self.moments);

        let rows: Vec<FeatureRow> = bars
            .into_iter()
            .enumerate()
            .map(|(t, bar)| {
                let (upper_bollinger, lower_bollinger) = match (sma_20[t], std_20[t]) {
                    (Some(sma), Some(std)) => (Some(sma + 2.0 * std), Some(sma - 2.0 * std)),
                    _ => (None, None),
                };

                FeatureRow {
                    bar,
                    indicators: IndicatorValues {
                        ma_7: ma_7[t],
                        ma_21: ma_21[t],
                        ema_12: finite(ema_12[t]),
                        ema_26: finite(ema_26[t]),
                        macd: finite(ema_12[t] - ema_26[t]),
                        rsi_14: rsi_14[t],
                        roc_9: roc_9[t],
                        sma_20: sma_20[t],
                        std_20: std_20[t],
                        upper_bollinger,
                        lower_bollinger,
                        volatility_7: volatility_7[t],
                        skewness_21: skewness_21[t],
                        kurtosis_21: kurtosis_21[t],
                    },
                }
            })
            .collect();

        debug!(symbol = %symbol, rows = rows.len(), "computed indicators");

        Ok(FeatureSeries {
            symbol,
            columns,
            rows,
        })
    }
}

fn rolling<F>(values: &[f64], size: usize, stat: F) -> Vec<Option<f64>>
where
    F: Fn(&RollingWindow) -> Option<f64>,
{
    let mut window = RollingWindow::new(size);
    values
        .iter()
        .map(|&v| {
            window.push(v);
            stat(&window)
        })
        .collect()
}

/// Simple mean over the trailing `size` values.
pub fn rolling_mean(values: &[f64], size: usize) -> Vec<Option<f64>> {
    rolling(values, size, RollingWindow::mean)
}

/// Sample standard deviation over the trailing `size` values.
pub fn rolling_std(values: &[f64], size: usize) -> Vec<Option<f64>> {
    rolling(values, size, RollingWindow::sample_std)
}

pub fn rolling_skewness(
    values: &[f64],
    size: usize,
    estimator: MomentEstimator,
) -> Vec<Option<f64>> {
    rolling(values, size, |w| w.skewness(estimator))
}

pub fn rolling_kurtosis(
    values: &[f64],
    size: usize,
    estimator: MomentEstimator,
) -> Vec<Option<f64>> {
    rolling(values, size, |w| w.excess_kurtosis(estimator))
}

/// Exponential moving average with `alpha = 2 / (span + 1)`, seeded with the
/// first value and no bias adjustment.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;

    for &v in values {
        let next = match prev {
            None => v,
            Some(p) => alpha * v + (1.0 - alpha) * p,
        };
        out.push(next);
        prev = Some(next);
    }

    out
}

/// Relative Strength Index from simple means of gains and losses over the
/// trailing `period` close-to-close changes.
///
/// The first value appears at index `period`. A window with no losses but
/// some gains reads 100; a window with neither is undefined.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut gains = RollingWindow::new(period);
    let mut losses = RollingWindow::new(period);
    let mut out = Vec::with_capacity(closes.len());

    for (t, &close) in closes.iter().enumerate() {
        if t == 0 {
            out.push(None);
            continue;
        }

        let delta = close - closes[t - 1];
        gains.push(delta.max(0.0));
        losses.push((-delta).max(0.0));

        let value = match (gains.mean(), losses.mean()) {
            (Some(gain), Some(loss)) => rsi_from_averages(gain, loss),
            _ => None,
        };
        out.push(value);
    }

    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 {
        return (avg_gain > 0.0).then_some(100.0);
    }
    let rs = avg_gain / avg_loss;
    finite(100.0 - 100.0 / (1.0 + rs))
}

/// Fractional change versus the value `periods` positions earlier.
/// Undefined while history is short or when the earlier value is zero.
pub fn rate_of_change(values: &[f64], periods: usize) -> Vec<Option<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(t, &v)| {
            let base = *values.get(t.checked_sub(periods)?)?;
            if base == 0.0 {
                return None;
            }
            finite((v - base) / base)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn series_from_closes(closes: &[f64]) -> TimeSeries {
        let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Bar::new(
                    start + Duration::days(i as i64),
                    Some(c),
                    Some(c + 1.0),
                    Some(c - 1.0),
                    Some(c),
                    Some(1_000.0),
                )
            })
            .collect();
        TimeSeries::new("stocks_TEST", bars).unwrap()
    }

    fn choppy_closes(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + ((i * 7) % 11) as f64).collect()
    }

    fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("value should be defined");
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    /// Leading rows without a value for each indicator.
    fn warmup(indicator: Indicator) -> usize {
        match indicator {
            Indicator::Ema12 | Indicator::Ema26 | Indicator::Macd => 0,
            Indicator::Ma7 | Indicator::Volatility => 6,
            Indicator::Roc => 9,
            Indicator::Rsi => 14,
            Indicator::Sma20
            | Indicator::Std20
            | Indicator::UpperBollinger
            | Indicator::LowerBollinger => 19,
            Indicator::Ma21 | Indicator::Skewness | Indicator::Kurtosis => 20,
        }
    }

    #[test]
    fn test_column_names_in_output_order() {
        let names: Vec<_> = Indicator::ALL.iter().map(|i| i.column_name()).collect();
        assert_eq!(
            names,
            vec![
                "7_day_MA",
                "21_day_MA",
                "12_day_EMA",
                "26_day_EMA",
                "MACD",
                "RSI",
                "ROC",
                "20_day_SMA",
                "20_day_STD",
                "Upper_Bollinger",
                "Lower_Bollinger",
                "Volatility",
                "Skewness",
                "Kurtosis",
            ]
        );
    }

    #[test]
    fn test_window_boundaries() {
        let features = IndicatorEngine::default()
            .compute(series_from_closes(&choppy_closes(40)))
            .unwrap();

        for indicator in Indicator::ALL {
            let column = features.column(indicator);
            let first = warmup(indicator);
            assert!(
                column[..first].iter().all(Option::is_none),
                "{} defined too early",
                indicator.column_name()
            );
            assert!(
                column[first..].iter().all(Option::is_some),
                "{} undefined after warm-up",
                indicator.column_name()
            );
        }
    }

    #[test]
    fn test_seven_day_ma_scenario() {
        let closes: Vec<f64> = (10..=20).map(f64::from).collect();
        let features = IndicatorEngine::default()
            .compute(series_from_closes(&closes))
            .unwrap();
        let ma = features.column(Indicator::Ma7);

        assert!(ma[..6].iter().all(Option::is_none));
        assert_eq!(ma[6], Some(13.0));
        assert_eq!(ma[10], Some(17.0));
    }

    #[test]
    fn test_ema_seeded_with_first_close() {
        let out = ema(&[10.0, 23.0, 23.0], 12);
        assert_eq!(out[0], 10.0);
        assert!((out[1] - 12.0).abs() < 1e-12);
        let alpha = 2.0 / 13.0;
        assert!((out[2] - (alpha * 23.0 + (1.0 - alpha) * out[1])).abs() < 1e-12);
    }

    #[test]
    fn test_macd_identity() {
        let features = IndicatorEngine::default()
            .compute(series_from_closes(&choppy_closes(60)))
            .unwrap();
        for row in features.rows() {
            let i = &row.indicators;
            assert_eq!(i.macd, Some(i.ema_12.unwrap() - i.ema_26.unwrap()));
        }
    }

    #[test]
    fn test_bollinger_identity() {
        let features = IndicatorEngine::default()
            .compute(series_from_closes(&choppy_closes(60)))
            .unwrap();
        for row in features.rows() {
            let i = &row.indicators;
            if let (Some(upper), Some(lower), Some(std)) =
                (i.upper_bollinger, i.lower_bollinger, i.std_20)
            {
                assert!((upper - lower - 4.0 * std).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_rsi_monotonic_rise_reads_100() {
        let closes: Vec<f64> = (0..15).map(|i| 50.0 + i as f64).collect();
        let out = rsi(&closes, 14);
        assert!(out[..14].iter().all(Option::is_none));
        assert_eq!(out[14], Some(100.0));
    }

    #[test]
    fn test_rsi_mixed_moves() {
        let mut closes = vec![100.0];
        for _ in 0..7 {
            let last = *closes.last().unwrap();
            closes.push(last + 2.0);
            closes.push(last + 1.0);
        }
        // mean gain 1.0, mean loss 0.5 -> RS 2
        assert_close(rsi(&closes, 14)[14], 100.0 - 100.0 / 3.0);
    }

    #[test]
    fn test_rsi_flat_window_is_undefined() {
        let out = rsi(&[5.0; 20], 14);
        assert!(out.iter().all(Option::is_none));
    }

    #[test]
    fn test_rsi_monotonic_fall_reads_zero() {
        let closes: Vec<f64> = (0..16).map(|i| 90.0 - i as f64).collect();
        assert_eq!(rsi(&closes, 14)[15], Some(0.0));
    }

    #[test]
    fn test_roc_scenario() {
        let closes: Vec<f64> = (0..=10).map(|i| 100.0 + i as f64 * 10.0 / 9.0).collect();
        let mut closes = closes;
        closes[9] = 110.0;
        let out = rate_of_change(&closes, 9);
        assert!(out[..9].iter().all(Option::is_none));
        assert_eq!(out[9], Some(0.10));
    }

    #[test]
    fn test_roc_zero_base_is_undefined() {
        let mut closes = vec![1.0; 12];
        closes[1] = 0.0;
        let out = rate_of_change(&closes, 9);
        assert_eq!(out[9], Some(0.0));
        assert_eq!(out[10], None);
    }

    #[test]
    fn test_linear_closes_shape_statistics() {
        let closes: Vec<f64> = (1..=30).map(f64::from).collect();
        let features = IndicatorEngine::default()
            .compute(series_from_closes(&closes))
            .unwrap();
        let row = &features.rows()[25].indicators;

        assert_close(row.skewness_21, 0.0);
        // discrete uniform over 21 points
        assert_close(row.kurtosis_21, -6.0 * 442.0 / (5.0 * 440.0));
    }

    #[test]
    fn test_missing_close_is_rejected() {
        let mut bars = series_from_closes(&[1.0, 2.0, 3.0]).into_parts().2;
        bars[1].close = None;
        let series = TimeSeries::new("X", bars).unwrap();

        let err = IndicatorEngine::default().compute(series).unwrap_err();
        assert!(matches!(err, PipelineError::MissingClose { .. }));
    }

    #[test]
    fn test_empty_series_yields_no_rows() {
        let features = IndicatorEngine::default()
            .compute(TimeSeries::new("X", Vec::new()).unwrap())
            .unwrap();
        assert!(features.is_empty());
        assert_eq!(features.symbol(), "X");
    }

    #[test]
    fn test_original_columns_are_preserved() {
        let series = series_from_closes(&choppy_closes(25));
        let bars = series.bars().to_vec();
        let features = IndicatorEngine::default().compute(series).unwrap();

        assert_eq!(features.len(), bars.len());
        for (row, bar) in features.rows().iter().zip(bars) {
            assert_eq!(row.bar, bar);
        }
    }
}
