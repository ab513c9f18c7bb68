use std::str::FromStr;
use tracing::debug;

use crate::data::series::{PriceField, TimeSeries};
use crate::error::{PipelineError, Result};

/// What to do with a column that has no observed value in the whole series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyColumnPolicy {
    /// Fail the series with [`PipelineError::EmptyColumn`].
    #[default]
    Reject,
    /// Keep the column absent in every row.
    LeaveAbsent,
}

impl FromStr for EmptyColumnPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "reject" | "fail" => Ok(Self::Reject),
            "leave" | "leave_absent" => Ok(Self::LeaveAbsent),
            other => Err(PipelineError::Config(format!(
                "unknown empty column policy: {}",
                other
            ))),
        }
    }
}

/// Repairs gaps in a raw series before any windowed computation.
///
/// Sanitization runs in two steps:
/// 1. Bars with every numeric field absent are dropped.
/// 2. Each column the source carried has its gaps filled with the median of that column's
///    observed values, computed once over the whole series before any fill.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sanitizer {
    empty_column: EmptyColumnPolicy,
}

impl Sanitizer {
    /// Creates a sanitizer applying `empty_column` to columns with no observation.
    pub fn new(empty_column: EmptyColumnPolicy) -> Self {
        Self { empty_column }
    }

    /// Drops empty bars and median-fills every column listed in
    /// [`TimeSeries::columns`]. Columns the source never carried stay absent.
    ///
    /// An empty series (or one that becomes empty after the row drop) is
    /// returned unchanged.
    ///
    /// # Errors
    /// Returns [`PipelineError::EmptyColumn`] under [`EmptyColumnPolicy::Reject`]
    /// when a column has no observed value.
    pub fn sanitize(&self, series: TimeSeries) -> Result<TimeSeries> {
        let (symbol, columns, mut bars) = series.into_parts();

        let before = bars.len();
        bars.retain(|bar| !bar.is_empty());
        if bars.len() < before {
            debug!(symbol = %symbol, dropped = before - bars.len(), "dropped empty bars");
        }

        if bars.is_empty() {
            return Ok(TimeSeries::from_validated(symbol, columns, bars));
        }

        for &field in &columns {
            let mut observed: Vec<f64> = bars.iter().filter_map(|bar| bar.get(field)).collect();
            if observed.len() == bars.len() {
                continue;
            }

            let Some(fill) = median(&mut observed) else {
                match self.empty_column {
                    EmptyColumnPolicy::Reject => {
                        return Err(PipelineError::EmptyColumn { field });
                    }
                    EmptyColumnPolicy::LeaveAbsent => {
                        debug!(symbol = %symbol, %field, "column has no observations, left absent");
                        continue;
                    }
                }
            };

            let mut filled = 0usize;
            for bar in bars.iter_mut().filter(|bar| bar.get(field).is_none()) {
                bar.set(field, Some(fill));
                filled += 1;
            }
            debug!(symbol = %symbol, %field, filled, fill, "median-filled gaps");
        }

        Ok(TimeSeries::from_validated(symbol, columns, bars))
    }

    /// Outlier treatment hook. Currently leaves the series untouched.
    pub fn treat_outliers(&self, series: TimeSeries) -> TimeSeries {
        series
    }
}

/// Median of `values`, averaging the two middle values for an even count.
/// Reorders the slice. Returns `None` for an empty slice.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::series::Bar;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, d).unwrap()
    }

    fn full(d: u32, v: f64) -> Bar {
        Bar::new(day(d), Some(v), Some(v + 1.0), Some(v - 1.0), Some(v), Some(1000.0 * v))
    }

    fn gappy_series() -> TimeSeries {
        let mut b2 = full(2, 20.0);
        b2.close = None;
        b2.volume = None;
        let mut b4 = full(4, 40.0);
        b4.close = None;

        TimeSeries::new(
            "stocks_TEST",
            vec![
                full(1, 10.0),
                b2,
                Bar::new(day(3), None, None, None, None, None),
                b4,
                full(5, 50.0),
                full(6, 30.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        let mut none: [f64; 0] = [];
        assert_eq!(median(&mut none), None);
    }

    #[test]
    fn test_drops_only_fully_empty_rows() {
        let out = Sanitizer::default().sanitize(gappy_series()).unwrap();
        let dates: Vec<_> = out.bars().iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![day(1), day(2), day(4), day(5), day(6)]);
    }

    #[test]
    fn test_no_residual_gaps() {
        let out = Sanitizer::default().sanitize(gappy_series()).unwrap();
        for bar in out.bars() {
            for field in PriceField::ALL {
                assert!(bar.get(field).is_some(), "{} missing on {}", field, bar.date);
            }
        }
    }

    #[test]
    fn test_fill_uses_median_of_observed_values() {
        let out = Sanitizer::default().sanitize(gappy_series()).unwrap();
        // observed closes: 10, 50, 30 -> median 30
        assert_eq!(out.bars()[1].close, Some(30.0));
        assert_eq!(out.bars()[2].close, Some(30.0));
        // observed volumes: 10000, 40000, 50000, 30000 -> median 35000
        assert_eq!(out.bars()[1].volume, Some(35000.0));
        // untouched values stay as they were
        assert_eq!(out.bars()[4].close, Some(30.0));
        assert_eq!(out.bars()[3].close, Some(50.0));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let sanitizer = Sanitizer::default();
        let once = sanitizer.sanitize(gappy_series()).unwrap();
        let twice = sanitizer.sanitize(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_column_rejected_by_default() {
        let bars = (1..=3)
            .map(|d| Bar::new(day(d), Some(1.0), None, None, Some(1.0), None))
            .collect();
        let series = TimeSeries::new("X", bars).unwrap();

        let err = Sanitizer::default().sanitize(series).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyColumn { field: PriceField::High }));
    }

    #[test]
    fn test_empty_column_left_absent_when_configured() {
        let bars = vec![
            Bar::new(day(1), Some(1.0), None, None, Some(1.0), None),
            Bar::new(day(2), None, None, None, Some(3.0), None),
        ];
        let series = TimeSeries::new("X", bars).unwrap();

        let sanitizer = Sanitizer::new(EmptyColumnPolicy::LeaveAbsent);
        let out = sanitizer.sanitize(series).unwrap();
        assert_eq!(out.bars()[1].open, Some(1.0));
        assert!(out.bars().iter().all(|b| b.volume.is_none()));

        let again = sanitizer.sanitize(out.clone()).unwrap();
        assert_eq!(out, again);
    }

    #[test]
    fn test_bar_with_single_field_is_kept_and_filled() {
        let mut bars = gappy_series().into_parts().2;
        bars.push(Bar::new(day(7), None, None, None, None, Some(7000.0)));
        let out = Sanitizer::default()
            .sanitize(TimeSeries::new("stocks_TEST", bars).unwrap())
            .unwrap();

        let last = out.bars().last().unwrap();
        assert_eq!(last.date, day(7));
        assert_eq!(last.volume, Some(7000.0));
        // observed opens: 10, 20, 40, 50, 30 -> median 30
        assert_eq!(last.open, Some(30.0));
        assert_eq!(last.high, Some(31.0));
        assert_eq!(last.low, Some(29.0));
        assert_eq!(last.close, Some(30.0));
    }

    #[test]
    fn test_columns_missing_from_source_are_not_filled() {
        let bars = vec![
            Bar::new(day(1), Some(1.0), Some(2.0), Some(0.5), Some(1.5), None),
            Bar::new(day(2), Some(2.0), None, Some(1.5), Some(2.5), None),
        ];
        let columns = [PriceField::Open, PriceField::High, PriceField::Low, PriceField::Close];
        let series = TimeSeries::with_columns("X", &columns, bars).unwrap();

        let out = Sanitizer::default().sanitize(series).unwrap();

        assert_eq!(out.columns(), &columns);
        assert_eq!(out.bars()[1].high, Some(2.0));
        assert!(out.bars().iter().all(|b| b.volume.is_none()));
    }

    #[test]
    fn test_all_empty_series_becomes_empty() {
        let bars = vec![Bar::new(day(1), None, None, None, None, None)];
        let out = Sanitizer::default()
            .sanitize(TimeSeries::new("X", bars).unwrap())
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_treat_outliers_is_identity() {
        let series = gappy_series();
        let out = Sanitizer::default().treat_outliers(series.clone());
        assert_eq!(out, series);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("Reject".parse::<EmptyColumnPolicy>().unwrap(), EmptyColumnPolicy::Reject);
        assert_eq!(
            "leave".parse::<EmptyColumnPolicy>().unwrap(),
            EmptyColumnPolicy::LeaveAbsent
        );
        assert!("drop".parse::<EmptyColumnPolicy>().is_err());
    }
}
