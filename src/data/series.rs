use chrono::NaiveDate;
use std::fmt;

use crate::error::{PipelineError, Result};

/// One of the numeric columns carried by a [`Bar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceField {
    /// All numeric columns, in file order.
    pub const ALL: [PriceField; 5] = [
        PriceField::Open,
        PriceField::High,
        PriceField::Low,
        PriceField::Close,
        PriceField::Volume,
    ];

    /// Header used for this column in raw and processed files.
    pub fn column_name(self) -> &'static str {
        match self {
            PriceField::Open => "Open",
            PriceField::High => "High",
            PriceField::Low => "Low",
            PriceField::Close => "Close",
            PriceField::Volume => "Volume",
        }
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// A single daily OHLCV observation.
///
/// Every numeric field may be absent. A NaN handed to [`Bar::new`] is stored
/// as absent so that "missing" has exactly one representation.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl Bar {
    /// Creates a bar, normalizing NaN fields to absent.
    ///
    /// # Arguments
    /// * `date`: Trading day of the observation
    /// * `open`, `high`, `low`, `close`, `volume`: Observed values, `None` when missing
    ///
    /// # Returns
    /// A `Bar` in which every present field is a non-NaN number
    pub fn new(
        date: NaiveDate,
        open: Option<f64>,
        high: Option<f64>,
        low: Option<f64>,
        close: Option<f64>,
        volume: Option<f64>,
    ) -> Self {
        Self {
            date,
            open: observed(open),
            high: observed(high),
            low: observed(low),
            close: observed(close),
            volume: observed(volume),
        }
    }

    /// Value of one column, `None` when absent.
    pub fn get(&self, field: PriceField) -> Option<f64> {
        match field {
            PriceField::Open => self.open,
            PriceField::High => self.high,
            PriceField::Low => self.low,
            PriceField::Close => self.close,
            PriceField::Volume => self.volume,
        }
    }

    /// Overwrites one column. A NaN `value` is stored as absent.
    pub fn set(&mut self, field: PriceField, value: Option<f64>) {
        let value = observed(value);
        match field {
            PriceField::Open => self.open = value,
            PriceField::High => self.high = value,
            PriceField::Low => self.low = value,
            PriceField::Close => self.close = value,
            PriceField::Volume => self.volume = value,
        }
    }

    /// True when no numeric field is present.
    pub fn is_empty(&self) -> bool {
        PriceField::ALL.iter().all(|&field| self.get(field).is_none())
    }
}

fn observed(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

/// Ordered daily bars for one asset.
///
/// Dates are strictly increasing. Windowed indicators rely on position in
/// this sequence, never on calendar arithmetic.
///
/// The series also records which numeric columns its source carried. A
/// column outside that set is absent in every bar and is neither filled
/// nor written back out.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    symbol: String,
    columns: Vec<PriceField>,
    bars: Vec<Bar>,
}

impl TimeSeries {
    /// Builds a series carrying all five numeric columns.
    ///
    /// # Errors
    /// Returns [`PipelineError::DuplicateDate`] or [`PipelineError::Unsorted`]
    /// if the bars are not strictly increasing by date.
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self> {
        Self::with_columns(symbol, &PriceField::ALL, bars)
    }

    /// Builds a series whose source only carried `columns`.
    ///
    /// # Arguments
    /// * `symbol`: Asset name, usually the raw file stem
    /// * `columns`: Numeric columns present in the source, in any order
    /// * `bars`: Observations sorted by ascending date
    ///
    /// # Errors
    /// Returns [`PipelineError::DuplicateDate`] or [`PipelineError::Unsorted`]
    /// if the bars are not strictly increasing by date.
    ///
    /// # Returns
    /// A validated series. Fields of columns not listed are cleared.
    pub fn with_columns(
        symbol: impl Into<String>,
        columns: &[PriceField],
        mut bars: Vec<Bar>,
    ) -> Result<Self> {
        for (index, pair) in bars.windows(2).enumerate() {
            let (previous, current) = (pair[0].date, pair[1].date);
            if current == previous {
                return Err(PipelineError::DuplicateDate {
                    index: index + 1,
                    date: current,
                });
            }
            if current < previous {
                return Err(PipelineError::Unsorted {
                    index: index + 1,
                    previous,
                    current,
                });
            }
        }

        let columns: Vec<PriceField> = PriceField::ALL
            .into_iter()
            .filter(|field| columns.contains(field))
            .collect();
        for field in PriceField::ALL.into_iter().filter(|f| !columns.contains(f)) {
            for bar in &mut bars {
                bar.set(field, None);
            }
        }

        Ok(Self {
            symbol: symbol.into(),
            columns,
            bars,
        })
    }

    /// Rebuilds a series from bars derived from an already validated one.
    /// Callers may only drop or edit bars in place, never reorder them.
    pub(crate) fn from_validated(symbol: String, columns: Vec<PriceField>, bars: Vec<Bar>) -> Self {
        Self {
            symbol,
            columns,
            bars,
        }
    }

    /// Asset name the series was built with.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Numeric columns carried by the source, in file order.
    pub fn columns(&self) -> &[PriceField] {
        &self.columns
    }

    /// Bars in ascending date order.
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Splits the series into its symbol, column set and bars.
    pub fn into_parts(self) -> (String, Vec<PriceField>, Vec<Bar>) {
        (self.symbol, self.columns, self.bars)
    }
}
