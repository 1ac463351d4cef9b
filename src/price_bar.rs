use crate::analytics::result::Category;
use crate::symbol::Symbol;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One trading day's OHLCV record for a symbol.
///
/// Bars are keyed by `(symbol, date)`; the store never holds two bars for the
/// same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub symbol: Symbol,
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn new(
        symbol: Symbol,
        date: NaiveDate,
        open: f64,
        close: f64,
        high: f64,
        low: f64,
        volume: f64,
    ) -> Self {
        PriceBar {
            symbol,
            date,
            open,
            close,
            high,
            low,
            volume,
        }
    }

    /// Returns the value of the requested field.
    pub fn field(&self, category: Category) -> f64 {
        match category {
            Category::Open => self.open,
            Category::Close => self.close,
            Category::High => self.high,
            Category::Low => self.low,
            Category::Volume => self.volume,
        }
    }

    /// Close price times share volume.
    pub fn dollar_volume(&self) -> f64 {
        self.close * self.volume
    }
}

/// Column view over an ascending series of bars.
///
/// The statistics engine works on parallel `(values, dates)` slices; this
/// extracts them once per field.
#[derive(Debug, Clone, PartialEq)]
pub struct BarSeries {
    pub dates: Vec<NaiveDate>,
    pub open: Vec<f64>,
    pub close: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub volume: Vec<f64>,
}

impl BarSeries {
    pub fn from_bars(bars: &[PriceBar]) -> Self {
        BarSeries {
            dates: bars.iter().map(|bar| bar.date).collect(),
            open: bars.iter().map(|bar| bar.open).collect(),
            close: bars.iter().map(|bar| bar.close).collect(),
            high: bars.iter().map(|bar| bar.high).collect(),
            low: bars.iter().map(|bar| bar.low).collect(),
            volume: bars.iter().map(|bar| bar.volume).collect(),
        }
    }

    pub fn values(&self, category: Category) -> &[f64] {
        match category {
            Category::Open => &self.open,
            Category::Close => &self.close,
            Category::High => &self.high,
            Category::Low => &self.low,
            Category::Volume => &self.volume,
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}
