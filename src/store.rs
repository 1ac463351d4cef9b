use crate::analytics::result::{AnalysisResult, AnalysisType, Category, CombinedResult, Period};
use crate::price_bar::PriceBar;
use crate::symbol::Symbol;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

/// Read/write access to stored price bars.
///
/// The statistics engine only talks to storage through this trait so it can
/// run against SQLite in production and an in-memory map in tests.
pub trait PriceStore {
    /// Returns the raw text of the latest stored date for `symbol`, or `None`
    /// when the symbol has no bars.
    ///
    /// The value is returned unparsed so callers can decide how to treat a
    /// malformed date.
    fn max_stored_date(&self, symbol: &Symbol) -> Result<Option<String>, StoreError>;

    /// Stores bars, silently skipping any `(symbol, date)` already present.
    ///
    /// # Returns
    /// The number of newly inserted bars.
    fn save_bars(&mut self, bars: &[PriceBar]) -> Result<usize, StoreError>;

    /// Bars for `symbol` dated on or after `floor`, ascending by date.
    fn load_since(&self, symbol: &Symbol, floor: NaiveDate) -> Result<Vec<PriceBar>, StoreError>;

    /// The `count` most recent bars for `symbol`, descending by date.
    fn load_recent_by_count(&self, symbol: &Symbol, count: usize) -> Result<Vec<PriceBar>, StoreError>;

    /// Every symbol with at least one stored bar, in lexicographic order.
    fn symbols(&self) -> Result<Vec<Symbol>, StoreError>;
}

/// Upsert storage for analysis results.
pub trait ResultStore {
    /// Writes every storable entry of `result`, replacing any row with the same
    /// `(symbol, category, analysis_type, period)`.
    ///
    /// The batch is applied atomically: on error nothing from this call is
    /// kept.
    ///
    /// # Returns
    /// The number of rows written.
    fn persist_results(
        &mut self,
        result: &CombinedResult,
        created_at: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// All stored results for `symbol`.
    fn load_results(&self, symbol: &Symbol) -> Result<Vec<AnalysisResult>, StoreError>;
}

// Lets a caller lend a store it keeps owning (e.g. behind a mutex guard).
impl<T: PriceStore + ?Sized> PriceStore for &mut T {
    fn max_stored_date(&self, symbol: &Symbol) -> Result<Option<String>, StoreError> {
        (**self).max_stored_date(symbol)
    }

    fn save_bars(&mut self, bars: &[PriceBar]) -> Result<usize, StoreError> {
        (**self).save_bars(bars)
    }

    fn load_since(&self, symbol: &Symbol, floor: NaiveDate) -> Result<Vec<PriceBar>, StoreError> {
        (**self).load_since(symbol, floor)
    }

    fn load_recent_by_count(&self, symbol: &Symbol, count: usize) -> Result<Vec<PriceBar>, StoreError> {
        (**self).load_recent_by_count(symbol, count)
    }

    fn symbols(&self) -> Result<Vec<Symbol>, StoreError> {
        (**self).symbols()
    }
}

impl<T: ResultStore + ?Sized> ResultStore for &mut T {
    fn persist_results(
        &mut self,
        result: &CombinedResult,
        created_at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        (**self).persist_results(result, created_at)
    }

    fn load_results(&self, symbol: &Symbol) -> Result<Vec<AnalysisResult>, StoreError> {
        (**self).load_results(symbol)
    }
}

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid stored row: {0}")]
    InvalidRow(String),
}

type ResultKey = (Symbol, Category, AnalysisType, Period);

/// In-memory store for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    bars: BTreeMap<Symbol, BTreeMap<NaiveDate, PriceBar>>,
    results: BTreeMap<ResultKey, AnalysisResult>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored result rows across all symbols.
    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    /// Total number of stored bars for `symbol`.
    pub fn bar_count(&self, symbol: &Symbol) -> usize {
        self.bars.get(symbol).map_or(0, BTreeMap::len)
    }
}

impl PriceStore for InMemoryStore {
    fn max_stored_date(&self, symbol: &Symbol) -> Result<Option<String>, StoreError> {
        Ok(self
            .bars
            .get(symbol)
            .and_then(|bars| bars.keys().next_back())
            .map(|date| date.format("%Y-%m-%d").to_string()))
    }

    fn save_bars(&mut self, bars: &[PriceBar]) -> Result<usize, StoreError> {
        let mut inserted = 0;
        for bar in bars {
            let series = self.bars.entry(bar.symbol.clone()).or_default();
            if !series.contains_key(&bar.date) {
                series.insert(bar.date, bar.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn load_since(&self, symbol: &Symbol, floor: NaiveDate) -> Result<Vec<PriceBar>, StoreError> {
        Ok(self
            .bars
            .get(symbol)
            .map(|bars| bars.range(floor..).map(|(_, bar)| bar.clone()).collect())
            .unwrap_or_default())
    }

    fn load_recent_by_count(&self, symbol: &Symbol, count: usize) -> Result<Vec<PriceBar>, StoreError> {
        Ok(self
            .bars
            .get(symbol)
            .map(|bars| bars.values().rev().take(count).cloned().collect())
            .unwrap_or_default())
    }

    fn symbols(&self) -> Result<Vec<Symbol>, StoreError> {
        Ok(self
            .bars
            .iter()
            .filter(|(_, bars)| !bars.is_empty())
            .map(|(symbol, _)| symbol.clone())
            .collect())
    }
}

impl ResultStore for InMemoryStore {
    fn persist_results(
        &mut self,
        result: &CombinedResult,
        created_at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let records = result.to_records(created_at);
        let written = records.len();
        for record in records {
            let key = (
                record.symbol.clone(),
                record.category,
                record.analysis_type.clone(),
                record.period,
            );
            self.results.insert(key, record);
        }
        Ok(written)
    }

    fn load_results(&self, symbol: &Symbol) -> Result<Vec<AnalysisResult>, StoreError> {
        Ok(self
            .results
            .values()
            .filter(|record| &record.symbol == symbol)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bars(ticker: &str, count: i64) -> Vec<PriceBar> {
        let symbol = Symbol::new(ticker).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..count)
            .map(|i| {
                let price = 100.0 + i as f64;
                PriceBar::new(
                    symbol.clone(),
                    start + Duration::days(i),
                    price,
                    price,
                    price,
                    price,
                    1_000.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_save_bars_is_idempotent() {
        let mut store = InMemoryStore::new();
        let data = bars("AAPL", 3);
        assert_eq!(store.save_bars(&data).unwrap(), 3);
        assert_eq!(store.save_bars(&data).unwrap(), 0);
        assert_eq!(store.bar_count(&Symbol::new("AAPL").unwrap()), 3);
    }

    #[test]
    fn test_max_stored_date() {
        let mut store = InMemoryStore::new();
        let symbol = Symbol::new("AAPL").unwrap();
        assert_eq!(store.max_stored_date(&symbol).unwrap(), None);
        store.save_bars(&bars("AAPL", 3)).unwrap();
        assert_eq!(
            store.max_stored_date(&symbol).unwrap(),
            Some("2024-01-03".to_string())
        );
    }

    #[test]
    fn test_load_since_and_recent_by_count_ordering() {
        let mut store = InMemoryStore::new();
        let symbol = Symbol::new("AAPL").unwrap();
        store.save_bars(&bars("AAPL", 10)).unwrap();

        let since = store
            .load_since(&symbol, NaiveDate::from_ymd_opt(2024, 1, 8).unwrap())
            .unwrap();
        assert_eq!(since.len(), 3);
        assert!(since[0].date < since[2].date);

        let recent = store.load_recent_by_count(&symbol, 4).unwrap();
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[0].date, NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
        assert!(recent[0].date > recent[3].date);
    }

    #[test]
    fn test_symbols_sorted() {
        let mut store = InMemoryStore::new();
        store.save_bars(&bars("MSFT", 1)).unwrap();
        store.save_bars(&bars("AAPL", 1)).unwrap();
        let symbols: Vec<String> = store
            .symbols()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_persist_results_upserts() {
        let mut store = InMemoryStore::new();
        let symbol = Symbol::new("ACME").unwrap();

        let mut first = CombinedResult::new(symbol.clone());
        first.push(Category::Close, AnalysisType::Trend, Period::Month, Some(1.0));
        store.persist_results(&first, Utc::now()).unwrap();

        let mut second = CombinedResult::new(symbol.clone());
        second.push(Category::Close, AnalysisType::Trend, Period::Month, Some(2.0));
        store.persist_results(&second, Utc::now()).unwrap();

        let rows = store.load_results(&symbol).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 2.0);
    }

    #[test]
    fn test_borrowed_store_writes_through() {
        fn save_into<S: PriceStore>(mut store: S, data: &[PriceBar]) -> usize {
            store.save_bars(data).unwrap()
        }

        let mut store = InMemoryStore::new();
        assert_eq!(save_into(&mut store, &bars("AAPL", 2)), 2);
        assert_eq!(store.bar_count(&Symbol::new("AAPL").unwrap()), 2);
    }
}
