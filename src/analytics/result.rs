//! Typed result records produced by the statistics engine.
//!
//! Every value is addressed by `(category, analysis_type, period)`, which is
//! also the per-symbol uniqueness key in storage.

use crate::symbol::{Symbol, SymbolError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Bar field an analysis value was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Open,
    Close,
    High,
    Low,
    Volume,
}

impl Category {
    /// Price fields that receive trend/volatility/return metrics.
    pub const PRICES: [Category; 4] = [
        Category::Close,
        Category::Open,
        Category::High,
        Category::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Open => "open",
            Category::Close => "close",
            Category::High => "high",
            Category::Low => "low",
            Category::Volume => "volume",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ParseAnalysisTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Category::Open),
            "close" => Ok(Category::Close),
            "high" => Ok(Category::High),
            "low" => Ok(Category::Low),
            "volume" => Ok(Category::Volume),
            other => Err(ParseAnalysisTypeError::UnknownCategory(other.to_string())),
        }
    }
}

/// Lookback bucket a value is stored under.
///
/// The stored label and the window actually applied differ for the weekly
/// bucket: label 7 is computed from a 5-day date window (or the last 5
/// entries for volume).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum Period {
    Week,
    Month,
}

impl Period {
    pub const ALL: [Period; 2] = [Period::Week, Period::Month];

    /// Value persisted in the `period` column.
    pub fn label(&self) -> u32 {
        match self {
            Period::Week => 7,
            Period::Month => 30,
        }
    }

    /// Calendar-day argument handed to the window filter.
    pub fn lookback_days(&self) -> i64 {
        match self {
            Period::Week => 5,
            Period::Month => 30,
        }
    }

    /// Entry count used when re-slicing the volume window.
    pub fn tail_count(&self) -> usize {
        match self {
            Period::Week => 5,
            Period::Month => 30,
        }
    }
}

impl From<Period> for u32 {
    fn from(period: Period) -> Self {
        period.label()
    }
}

impl TryFrom<u32> for Period {
    type Error = ParseAnalysisTypeError;

    fn try_from(label: u32) -> Result<Self, Self::Error> {
        match label {
            7 => Ok(Period::Week),
            30 => Ok(Period::Month),
            other => Err(ParseAnalysisTypeError::UnknownPeriod(other)),
        }
    }
}

/// Kind of statistic stored in a result row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum AnalysisType {
    Trend,
    Volatility,
    AvgDailyReturn,
    TotalReturn,
    RiskRewardRatio,
    /// Mean of the volume slice.
    Average,
    /// Population standard deviation of the volume slice.
    StdDev,
    /// Pearson correlation of close prices against the named symbol.
    CorrelationCoeff(Symbol),
}

const CORRELATION_SUFFIX: &str = "_correlation_coeff";

impl AnalysisType {
    /// Symbol recorded in `top_stock_symbol` for this row, if any.
    pub fn top_stock_symbol(&self) -> Option<&Symbol> {
        match self {
            AnalysisType::CorrelationCoeff(symbol) => Some(symbol),
            _ => None,
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisType::Trend => f.write_str("trend"),
            AnalysisType::Volatility => f.write_str("volatility"),
            AnalysisType::AvgDailyReturn => f.write_str("avg_daily_return"),
            AnalysisType::TotalReturn => f.write_str("total_return"),
            AnalysisType::RiskRewardRatio => f.write_str("risk_reward_ratio"),
            AnalysisType::Average => f.write_str("average"),
            AnalysisType::StdDev => f.write_str("std_dev"),
            AnalysisType::CorrelationCoeff(symbol) => {
                write!(f, "{}{}", symbol, CORRELATION_SUFFIX)
            }
        }
    }
}

impl FromStr for AnalysisType {
    type Err = ParseAnalysisTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trend" => Ok(AnalysisType::Trend),
            "volatility" => Ok(AnalysisType::Volatility),
            "avg_daily_return" => Ok(AnalysisType::AvgDailyReturn),
            "total_return" => Ok(AnalysisType::TotalReturn),
            "risk_reward_ratio" => Ok(AnalysisType::RiskRewardRatio),
            "average" => Ok(AnalysisType::Average),
            "std_dev" => Ok(AnalysisType::StdDev),
            other => match other.strip_suffix(CORRELATION_SUFFIX) {
                Some(symbol) => Ok(AnalysisType::CorrelationCoeff(Symbol::new(symbol)?)),
                None => Err(ParseAnalysisTypeError::UnknownAnalysisType(other.to_string())),
            },
        }
    }
}

impl From<AnalysisType> for String {
    fn from(analysis_type: AnalysisType) -> Self {
        analysis_type.to_string()
    }
}

impl TryFrom<String> for AnalysisType {
    type Error = ParseAnalysisTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Raised when a stored row names a metric, category or period this crate
/// does not produce.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseAnalysisTypeError {
    #[error("unknown analysis type '{0}'")]
    UnknownAnalysisType(String),
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("unknown period {0}")]
    UnknownPeriod(u32),
    #[error("invalid correlation symbol: {0}")]
    InvalidSymbol(#[from] SymbolError),
}

/// A single computed value; `None` when the window held too little data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub category: Category,
    pub analysis_type: AnalysisType,
    pub period: Period,
    pub value: Option<f64>,
}

/// Everything one `analyze` run produced for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedResult {
    pub symbol: Symbol,
    pub entries: Vec<MetricEntry>,
}

impl CombinedResult {
    pub fn new(symbol: Symbol) -> Self {
        CombinedResult {
            symbol,
            entries: Vec::new(),
        }
    }

    pub fn push(
        &mut self,
        category: Category,
        analysis_type: AnalysisType,
        period: Period,
        value: Option<f64>,
    ) {
        self.entries.push(MetricEntry {
            category,
            analysis_type,
            period,
            value,
        });
    }

    /// Looks up a value; `None` both when the entry is missing and when it was
    /// computed as absent.
    pub fn get(&self, category: Category, analysis_type: &AnalysisType, period: Period) -> Option<f64> {
        self.entries
            .iter()
            .find(|entry| {
                entry.category == category
                    && &entry.analysis_type == analysis_type
                    && entry.period == period
            })
            .and_then(|entry| entry.value)
    }

    pub fn entries_for(&self, category: Category) -> impl Iterator<Item = &MetricEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.category == category)
    }

    /// The correlated symbol, when a correlation entry was produced.
    pub fn top_stock_symbol(&self) -> Option<&Symbol> {
        self.entries
            .iter()
            .find_map(|entry| entry.analysis_type.top_stock_symbol())
    }

    /// Converts the storable entries into result rows.
    ///
    /// Absent and NaN values are dropped: the `value` column is NOT NULL and
    /// SQLite stores NaN as NULL. Infinite values are kept.
    pub fn to_records(&self, created_at: DateTime<Utc>) -> Vec<AnalysisResult> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let value = entry.value.filter(|v| !v.is_nan())?;
                Some(AnalysisResult {
                    symbol: self.symbol.clone(),
                    top_stock_symbol: entry.analysis_type.top_stock_symbol().cloned(),
                    category: entry.category,
                    analysis_type: entry.analysis_type.clone(),
                    period: entry.period,
                    value,
                    created_at,
                })
            })
            .collect()
    }
}

/// A persisted analysis row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub symbol: Symbol,
    pub top_stock_symbol: Option<Symbol>,
    pub category: Category,
    pub analysis_type: AnalysisType,
    pub period: Period,
    pub value: f64,
    pub created_at: DateTime<Utc>,
}
