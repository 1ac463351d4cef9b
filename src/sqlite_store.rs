use crate::analytics::result::{AnalysisResult, CombinedResult, Period};
use crate::price_bar::PriceBar;
use crate::store::{PriceStore, ResultStore, StoreError};
use crate::symbol::Symbol;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::path::Path;
use tracing::{debug, error, warn};

/// SQLite-backed storage for price bars and analysis results.
///
/// Creates the `stock_prices` and `stock_analysis` tables on open.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a file-based database.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file. If the file doesn't exist, it will be created.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established or the schema
    /// cannot be created.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        let store = SqliteStore { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Opens an in-memory database. Useful for testing.
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStore { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> SqliteResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS stock_prices (
                id INTEGER PRIMARY KEY,
                symbol TEXT NOT NULL,
                date TEXT NOT NULL,
                open_price REAL NOT NULL,
                close_price REAL NOT NULL,
                high_price REAL NOT NULL,
                low_price REAL NOT NULL,
                volume REAL NOT NULL,
                UNIQUE(symbol, date)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_stock_prices_symbol_date ON stock_prices(symbol, date)",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS stock_analysis (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                top_stock_symbol TEXT,
                category TEXT NOT NULL,
                analysis_type TEXT NOT NULL,
                period INTEGER NOT NULL,
                value REAL NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(symbol, category, analysis_type, period)
            )",
            [],
        )?;

        Ok(())
    }

    /// Checks if a table exists in the database.
    pub fn table_exists(&self, table_name: &str) -> SqliteResult<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")?;
        stmt.exists([table_name])
    }

    /// Returns a reference to the underlying SQLite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// A `stock_prices` row with its date still as stored text.
struct RawBarRow {
    date: String,
    open: f64,
    close: f64,
    high: f64,
    low: f64,
    volume: f64,
}

impl RawBarRow {
    fn from_row(row: &rusqlite::Row<'_>) -> SqliteResult<Self> {
        Ok(RawBarRow {
            date: row.get(0)?,
            open: row.get(1)?,
            close: row.get(2)?,
            high: row.get(3)?,
            low: row.get(4)?,
            volume: row.get(5)?,
        })
    }

    /// Rows whose date is not `YYYY-MM-DD` are logged and dropped.
    fn into_bar(self, symbol: &Symbol) -> Option<PriceBar> {
        match NaiveDate::parse_from_str(&self.date, "%Y-%m-%d") {
            Ok(date) => Some(PriceBar {
                symbol: symbol.clone(),
                date,
                open: self.open,
                close: self.close,
                high: self.high,
                low: self.low,
                volume: self.volume,
            }),
            Err(e) => {
                error!(
                    "Skipping {} bar with invalid date '{}' in database: {}",
                    symbol, self.date, e
                );
                None
            }
        }
    }
}

fn decode_bars(symbol: &Symbol, rows: Vec<RawBarRow>) -> Vec<PriceBar> {
    rows.into_iter().filter_map(|row| row.into_bar(symbol)).collect()
}

impl PriceStore for SqliteStore {
    fn max_stored_date(&self, symbol: &Symbol) -> Result<Option<String>, StoreError> {
        let latest = self.conn.query_row(
            "SELECT MAX(date) FROM stock_prices WHERE symbol = ?1",
            [symbol.as_str()],
            |row| row.get::<_, Option<String>>(0),
        )?;
        Ok(latest)
    }

    fn save_bars(&mut self, bars: &[PriceBar]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO stock_prices
                    (symbol, date, open_price, close_price, high_price, low_price, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for bar in bars {
                inserted += stmt.execute(params![
                    bar.symbol.as_str(),
                    bar.date,
                    bar.open,
                    bar.close,
                    bar.high,
                    bar.low,
                    bar.volume,
                ])?;
            }
        }
        tx.commit()?;

        debug!(
            "Inserted {} of {} bars ({} already stored)",
            inserted,
            bars.len(),
            bars.len() - inserted
        );
        Ok(inserted)
    }

    fn load_since(&self, symbol: &Symbol, floor: NaiveDate) -> Result<Vec<PriceBar>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT date, open_price, close_price, high_price, low_price, volume
             FROM stock_prices
             WHERE symbol = ?1 AND date >= ?2
             ORDER BY date",
        )?;
        let rows = stmt
            .query_map(params![symbol.as_str(), floor], RawBarRow::from_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(decode_bars(symbol, rows))
    }

    fn load_recent_by_count(&self, symbol: &Symbol, count: usize) -> Result<Vec<PriceBar>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT date, open_price, close_price, high_price, low_price, volume
             FROM stock_prices
             WHERE symbol = ?1
             ORDER BY date DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![symbol.as_str(), count as i64], RawBarRow::from_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(decode_bars(symbol, rows))
    }

    fn symbols(&self) -> Result<Vec<Symbol>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT DISTINCT symbol FROM stock_prices ORDER BY symbol")?;
        let raw = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(raw
            .into_iter()
            .filter_map(|ticker| match Symbol::new(&ticker) {
                Ok(symbol) => Some(symbol),
                Err(e) => {
                    warn!("Ignoring stored ticker '{}': {}", ticker, e);
                    None
                }
            })
            .collect())
    }
}

struct RawResultRow {
    symbol: String,
    top_stock_symbol: Option<String>,
    category: String,
    analysis_type: String,
    period: u32,
    value: f64,
    created_at: DateTime<Utc>,
}

impl RawResultRow {
    fn decode(self) -> Result<AnalysisResult, StoreError> {
        let invalid = |e: &dyn std::fmt::Display| StoreError::InvalidRow(e.to_string());
        Ok(AnalysisResult {
            symbol: Symbol::new(&self.symbol).map_err(|e| invalid(&e))?,
            top_stock_symbol: self
                .top_stock_symbol
                .map(Symbol::new)
                .transpose()
                .map_err(|e| invalid(&e))?,
            category: self.category.parse().map_err(|e| invalid(&e))?,
            analysis_type: self.analysis_type.parse().map_err(|e| invalid(&e))?,
            period: Period::try_from(self.period).map_err(|e| invalid(&e))?,
            value: self.value,
            created_at: self.created_at,
        })
    }
}

impl ResultStore for SqliteStore {
    fn persist_results(
        &mut self,
        result: &CombinedResult,
        created_at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let records = result.to_records(created_at);

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO stock_analysis
                    (symbol, top_stock_symbol, category, analysis_type, period, value, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(symbol, category, analysis_type, period) DO UPDATE SET
                    top_stock_symbol = excluded.top_stock_symbol,
                    value = excluded.value,
                    created_at = excluded.created_at",
            )?;
            for record in &records {
                stmt.execute(params![
                    record.symbol.as_str(),
                    record.top_stock_symbol.as_ref().map(Symbol::as_str),
                    record.category.as_str(),
                    record.analysis_type.to_string(),
                    record.period.label(),
                    record.value,
                    record.created_at,
                ])?;
            }
        }
        tx.commit()?;

        Ok(records.len())
    }

    fn load_results(&self, symbol: &Symbol) -> Result<Vec<AnalysisResult>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT symbol, top_stock_symbol, category, analysis_type, period, value, created_at
             FROM stock_analysis
             WHERE symbol = ?1
             ORDER BY category, analysis_type, period",
        )?;
        let rows = stmt
            .query_map([symbol.as_str()], |row| {
                Ok(RawResultRow {
                    symbol: row.get(0)?,
                    top_stock_symbol: row.get(1)?,
                    category: row.get(2)?,
                    analysis_type: row.get(3)?,
                    period: row.get(4)?,
                    value: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        rows.into_iter().map(RawResultRow::decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::result::{AnalysisType, Category};
    use chrono::{Duration, TimeZone};

    fn sample_bars(ticker: &str, count: i64, volume: f64) -> Vec<PriceBar> {
        let symbol = Symbol::new(ticker).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..count)
            .map(|i| {
                let price = 100.0 + i as f64;
                PriceBar::new(
                    symbol.clone(),
                    start + Duration::days(i),
                    price - 0.5,
                    price,
                    price + 1.0,
                    price - 1.0,
                    volume,
                )
            })
            .collect()
    }

    fn count_rows(store: &SqliteStore, table: &str) -> i64 {
        store
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_schema_created_on_open() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(store.table_exists("stock_prices").unwrap());
        assert!(store.table_exists("stock_analysis").unwrap());
        assert!(!store.table_exists("nonexistent_table").unwrap());
    }

    #[test]
    fn test_schema_creation_idempotent() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.ensure_schema().unwrap();
        assert!(store.table_exists("stock_prices").unwrap());
    }

    #[test]
    fn test_save_bars_skips_duplicates() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let bars = sample_bars("AAPL", 5, 1_000.0);
        assert_eq!(store.save_bars(&bars).unwrap(), 5);
        assert_eq!(store.save_bars(&bars[3..]).unwrap(), 0);
        assert_eq!(count_rows(&store, "stock_prices"), 5);
    }

    #[test]
    fn test_max_stored_date() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let symbol = Symbol::new("AAPL").unwrap();
        assert_eq!(store.max_stored_date(&symbol).unwrap(), None);

        store.save_bars(&sample_bars("AAPL", 5, 1_000.0)).unwrap();
        assert_eq!(
            store.max_stored_date(&symbol).unwrap(),
            Some("2024-01-05".to_string())
        );
    }

    #[test]
    fn test_load_since_ascending_with_inclusive_floor() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let symbol = Symbol::new("AAPL").unwrap();
        store.save_bars(&sample_bars("AAPL", 10, 1_000.0)).unwrap();
        store.save_bars(&sample_bars("MSFT", 10, 1_000.0)).unwrap();

        let floor = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        let bars = store.load_since(&symbol, floor).unwrap();
        assert_eq!(bars.len(), 4);
        assert_eq!(bars[0].date, floor);
        assert_eq!(bars[0].close, 106.0);
        assert_eq!(bars[0].open, 105.5);
        assert!(bars.windows(2).all(|pair| pair[0].date < pair[1].date));
        assert!(bars.iter().all(|bar| bar.symbol == symbol));
    }

    #[test]
    fn test_load_recent_by_count_descending() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let symbol = Symbol::new("AAPL").unwrap();
        store.save_bars(&sample_bars("AAPL", 10, 1_000.0)).unwrap();

        let bars = store.load_recent_by_count(&symbol, 3).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].close, 109.0);
        assert_eq!(bars[2].close, 107.0);
    }

    #[test]
    fn test_symbols_distinct_and_sorted() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        store.save_bars(&sample_bars("MSFT", 2, 1.0)).unwrap();
        store.save_bars(&sample_bars("AAPL", 3, 1.0)).unwrap();
        let symbols: Vec<String> = store
            .symbols()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_symbols_skip_invalid_tickers() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        store.save_bars(&sample_bars("AAPL", 2, 1.0)).unwrap();
        store
            .connection()
            .execute(
                "INSERT INTO stock_prices (symbol, date, open_price, close_price, high_price, low_price, volume)
                 VALUES ('BAD TICKER', '2024-01-02', 1.0, 1.0, 1.0, 1.0, 1.0)",
                [],
            )
            .unwrap();

        let symbols = store.symbols().unwrap();
        assert_eq!(symbols, vec![Symbol::new("AAPL").unwrap()]);
    }

    #[test]
    fn test_loads_skip_rows_with_invalid_dates() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        store.save_bars(&sample_bars("ACME", 3, 1.0)).unwrap();
        store
            .connection()
            .execute(
                "INSERT INTO stock_prices (symbol, date, open_price, close_price, high_price, low_price, volume)
                 VALUES ('ACME', 'not-a-date', 1.0, 1.0, 1.0, 1.0, 1.0)",
                [],
            )
            .unwrap();
        let symbol = Symbol::new("ACME").unwrap();

        let floor = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let since = store.load_since(&symbol, floor).unwrap();
        assert_eq!(since.len(), 3);
        assert_eq!(since[2].date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());

        let recent = store.load_recent_by_count(&symbol, 2).unwrap();
        // The bad row sorts first in text order and is dropped, not replaced.
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
    }

    #[test]
    fn test_persist_results_upsert_keeps_one_row() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let symbol = Symbol::new("ACME").unwrap();
        let created_at = Utc.with_ymd_and_hms(2024, 1, 15, 16, 0, 0).unwrap();

        let mut result = CombinedResult::new(symbol.clone());
        result.push(Category::Close, AnalysisType::Trend, Period::Month, Some(1.25));

        assert_eq!(store.persist_results(&result, created_at).unwrap(), 1);
        assert_eq!(store.persist_results(&result, created_at).unwrap(), 1);
        assert_eq!(count_rows(&store, "stock_analysis"), 1);

        let mut updated = CombinedResult::new(symbol.clone());
        updated.push(Category::Close, AnalysisType::Trend, Period::Month, Some(2.5));
        store
            .persist_results(&updated, created_at + Duration::days(1))
            .unwrap();

        let rows = store.load_results(&symbol).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 2.5);
        assert_eq!(rows[0].period, Period::Month);
        assert_eq!(rows[0].created_at, created_at + Duration::days(1));
    }

    #[test]
    fn test_persist_results_records_top_stock_symbol() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let symbol = Symbol::new("ACME").unwrap();
        let top = Symbol::new("MSFT").unwrap();

        let mut result = CombinedResult::new(symbol.clone());
        result.push(
            Category::Close,
            AnalysisType::CorrelationCoeff(top.clone()),
            Period::Month,
            Some(0.75),
        );
        result.push(Category::Volume, AnalysisType::Average, Period::Week, Some(10.0));
        result.push(Category::Volume, AnalysisType::StdDev, Period::Week, None);
        assert_eq!(store.persist_results(&result, Utc::now()).unwrap(), 2);

        let rows = store.load_results(&symbol).unwrap();
        let correlation = rows
            .iter()
            .find(|row| row.analysis_type == AnalysisType::CorrelationCoeff(top.clone()))
            .unwrap();
        assert_eq!(correlation.top_stock_symbol, Some(top.clone()));
        let average = rows
            .iter()
            .find(|row| row.analysis_type == AnalysisType::Average)
            .unwrap();
        assert_eq!(average.top_stock_symbol, None);
    }

    #[test]
    fn test_persist_results_failure_is_reported() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        store
            .connection()
            .execute("DROP TABLE stock_analysis", [])
            .unwrap();

        let mut result = CombinedResult::new(Symbol::new("ACME").unwrap());
        result.push(Category::Close, AnalysisType::Trend, Period::Week, Some(1.0));
        assert!(matches!(
            store.persist_results(&result, Utc::now()),
            Err(StoreError::Sqlite(_))
        ));
    }

    #[test]
    fn test_persist_results_rolls_back_partial_batch() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER reject_volatility BEFORE INSERT ON stock_analysis
                 WHEN NEW.analysis_type = 'volatility'
                 BEGIN SELECT RAISE(ABORT, 'volatility rejected'); END;",
            )
            .unwrap();

        let mut result = CombinedResult::new(Symbol::new("ACME").unwrap());
        result.push(Category::Close, AnalysisType::Trend, Period::Week, Some(1.0));
        result.push(Category::Close, AnalysisType::Volatility, Period::Week, Some(0.5));

        assert!(matches!(
            store.persist_results(&result, Utc::now()),
            Err(StoreError::Sqlite(_))
        ));
        // The trend row written before the failure is rolled back too.
        assert_eq!(count_rows(&store, "stock_analysis"), 0);
    }

    #[test]
    fn test_load_results_rejects_unknown_metric() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .connection()
            .execute(
                "INSERT INTO stock_analysis (symbol, category, analysis_type, period, value, created_at)
                 VALUES ('ACME', 'close', 'sharpe', 30, 1.0, '2024-01-15 16:00:00+00:00')",
                [],
            )
            .unwrap();

        let result = store.load_results(&Symbol::new("ACME").unwrap());
        assert!(matches!(result, Err(StoreError::InvalidRow(_))));
    }
}
