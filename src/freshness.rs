//! Keeps stored bars current up to the last completed trading day.

use crate::calendar::last_trading_day_at;
use crate::price_bar::PriceBar;
use crate::store::{PriceStore, StoreError};
use crate::symbol::Symbol;
use crate::yahoo_finance::DownloadError;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{error, info, warn};

/// Calendar days between the last trading day and the analysis query floor.
pub const QUERY_FLOOR_DAYS: i64 = 30;

/// Source of raw daily bars.
pub trait PriceFetcher {
    /// Fetches bars for `symbol` dated `start_date..=end_date`; an absent start
    /// lets the source pick its default history.
    fn fetch(
        &self,
        symbol: &Symbol,
        start_date: Option<NaiveDate>,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, DownloadError>;
}

/// Gap-fills a symbol's bars and yields the floor date for windowed queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessReconciler {
    timezone: Tz,
}

impl FreshnessReconciler {
    /// `timezone` is the exchange's local zone; "today" is evaluated there.
    pub fn new(timezone: Tz) -> Self {
        FreshnessReconciler { timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Reconciles `symbol` against the current time.
    pub fn ensure_fresh<S, F>(&self, store: &mut S, fetcher: &F, symbol: &Symbol) -> Result<NaiveDate, StoreError>
    where
        S: PriceStore,
        F: PriceFetcher,
    {
        self.ensure_fresh_at(store, fetcher, symbol, Utc::now())
    }

    /// Reconciles `symbol` as of `now`.
    ///
    /// Fetches the missing span `(latest stored date, last trading day]` when the
    /// store is behind, or the source's default history when nothing is stored.
    /// Retrieval failures and empty payloads are logged and tolerated; only
    /// storage errors are returned.
    ///
    /// # Returns
    /// `last trading day - 30 days`, whether or not a gap-fill happened.
    pub fn ensure_fresh_at<S, F>(
        &self,
        store: &mut S,
        fetcher: &F,
        symbol: &Symbol,
        now: DateTime<Utc>,
    ) -> Result<NaiveDate, StoreError>
    where
        S: PriceStore,
        F: PriceFetcher,
    {
        let stored = parse_stored_date(symbol, store.max_stored_date(symbol)?);
        let last_trading_day = last_trading_day_at(&now.with_timezone(&self.timezone));

        if stored.map_or(true, |latest| latest < last_trading_day) {
            let start_date = stored.map(|latest| latest + Duration::days(1));
            info!(
                "Fetching data for {} from {:?} to {}",
                symbol, start_date, last_trading_day
            );

            match fetcher.fetch(symbol, start_date, last_trading_day) {
                Ok(bars) if bars.is_empty() => {
                    warn!("No data found for {} in the given range", symbol);
                }
                Ok(bars) => {
                    let inserted = store.save_bars(&bars)?;
                    info!("Stored {} new bars for {}", inserted, symbol);
                }
                Err(e) => {
                    warn!("Failed to fetch data for {}: {}", symbol, e);
                }
            }
        }

        Ok(last_trading_day - Duration::days(QUERY_FLOOR_DAYS))
    }
}

/// Parses a stored `YYYY-MM-DD` date; malformed text is logged and treated as
/// absent so the caller falls back to a full reconciliation.
fn parse_stored_date(symbol: &Symbol, raw: Option<String>) -> Option<NaiveDate> {
    let raw = raw?;
    match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(e) => {
            error!(
                "Invalid date format in database for {}: {}. Error: {}",
                symbol, raw, e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_store::SqliteStore;
    use crate::store::InMemoryStore;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;
    use std::cell::RefCell;

    type FetchCall = (Option<NaiveDate>, NaiveDate);

    struct RecordingFetcher {
        calls: RefCell<Vec<FetchCall>>,
        response: Result<Vec<PriceBar>, DownloadError>,
    }

    impl RecordingFetcher {
        fn returning(response: Result<Vec<PriceBar>, DownloadError>) -> Self {
            RecordingFetcher {
                calls: RefCell::new(Vec::new()),
                response,
            }
        }

        fn calls(&self) -> Vec<FetchCall> {
            self.calls.borrow().clone()
        }
    }

    impl PriceFetcher for RecordingFetcher {
        fn fetch(
            &self,
            _symbol: &Symbol,
            start_date: Option<NaiveDate>,
            end_date: NaiveDate,
        ) -> Result<Vec<PriceBar>, DownloadError> {
            self.calls.borrow_mut().push((start_date, end_date));
            self.response.clone()
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bar(symbol: &Symbol, on: NaiveDate) -> PriceBar {
        PriceBar::new(symbol.clone(), on, 10.0, 10.0, 10.0, 10.0, 100.0)
    }

    // Wednesday 2024-01-17, 15:00 New York time.
    fn wednesday_afternoon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 17, 20, 0, 0).unwrap()
    }

    #[test]
    fn test_up_to_date_store_skips_retrieval() {
        let symbol = Symbol::new("ACME").unwrap();
        let mut store = InMemoryStore::new();
        store.save_bars(&[bar(&symbol, date(2024, 1, 16))]).unwrap();
        let fetcher = RecordingFetcher::returning(Ok(Vec::new()));

        let reconciler = FreshnessReconciler::new(New_York);
        let floor = reconciler
            .ensure_fresh_at(&mut store, &fetcher, &symbol, wednesday_afternoon())
            .unwrap();

        assert!(fetcher.calls().is_empty());
        assert_eq!(floor, date(2023, 12, 17));
    }

    #[test]
    fn test_requests_exactly_the_missing_gap() {
        let symbol = Symbol::new("ACME").unwrap();
        let mut store = InMemoryStore::new();
        // Last trading day is 2024-01-16; stored is five days earlier.
        store.save_bars(&[bar(&symbol, date(2024, 1, 11))]).unwrap();
        let gap: Vec<PriceBar> = [12, 15, 16]
            .iter()
            .map(|d| bar(&symbol, date(2024, 1, *d)))
            .collect();
        let fetcher = RecordingFetcher::returning(Ok(gap));

        let reconciler = FreshnessReconciler::new(New_York);
        reconciler
            .ensure_fresh_at(&mut store, &fetcher, &symbol, wednesday_afternoon())
            .unwrap();

        assert_eq!(
            fetcher.calls(),
            vec![(Some(date(2024, 1, 12)), date(2024, 1, 16))]
        );
        assert_eq!(store.bar_count(&symbol), 4);
    }

    #[test]
    fn test_empty_store_requests_open_start() {
        let symbol = Symbol::new("ACME").unwrap();
        let mut store = InMemoryStore::new();
        let fetcher = RecordingFetcher::returning(Ok(Vec::new()));

        let reconciler = FreshnessReconciler::new(New_York);
        let floor = reconciler
            .ensure_fresh_at(&mut store, &fetcher, &symbol, wednesday_afternoon())
            .unwrap();

        assert_eq!(fetcher.calls(), vec![(None, date(2024, 1, 16))]);
        assert_eq!(floor, date(2023, 12, 17));
    }

    #[test]
    fn test_retrieval_failure_is_tolerated() {
        let symbol = Symbol::new("ACME").unwrap();
        let mut store = InMemoryStore::new();
        store.save_bars(&[bar(&symbol, date(2024, 1, 10))]).unwrap();
        let fetcher =
            RecordingFetcher::returning(Err(DownloadError::Network("timed out".to_string())));

        let reconciler = FreshnessReconciler::new(New_York);
        let floor = reconciler
            .ensure_fresh_at(&mut store, &fetcher, &symbol, wednesday_afternoon())
            .unwrap();

        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(store.bar_count(&symbol), 1);
        assert_eq!(floor, date(2023, 12, 17));
    }

    #[test]
    fn test_weekend_reference_uses_friday() {
        let symbol = Symbol::new("ACME").unwrap();
        let mut store = InMemoryStore::new();
        let fetcher = RecordingFetcher::returning(Ok(Vec::new()));

        // Sunday 2024-01-21 noon in New York.
        let sunday = Utc.with_ymd_and_hms(2024, 1, 21, 17, 0, 0).unwrap();
        let floor = FreshnessReconciler::new(New_York)
            .ensure_fresh_at(&mut store, &fetcher, &symbol, sunday)
            .unwrap();

        assert_eq!(fetcher.calls(), vec![(None, date(2024, 1, 19))]);
        assert_eq!(floor, date(2023, 12, 20));
    }

    #[test]
    fn test_malformed_stored_date_triggers_full_reconciliation() {
        let symbol = Symbol::new("ACME").unwrap();
        let mut store = SqliteStore::new_in_memory().unwrap();
        store
            .connection()
            .execute(
                "INSERT INTO stock_prices (symbol, date, open_price, close_price, high_price, low_price, volume)
                 VALUES ('ACME', 'not-a-date', 1.0, 1.0, 1.0, 1.0, 1.0)",
                [],
            )
            .unwrap();
        let fetcher = RecordingFetcher::returning(Ok(Vec::new()));

        FreshnessReconciler::new(New_York)
            .ensure_fresh_at(&mut store, &fetcher, &symbol, wednesday_afternoon())
            .unwrap();

        assert_eq!(fetcher.calls(), vec![(None, date(2024, 1, 16))]);
    }

    #[test]
    fn test_malformed_stored_date_does_not_block_analysis() {
        use crate::analytics::engine::StatisticsEngine;
        use crate::analytics::result::{AnalysisType, Category, Period};

        let symbol = Symbol::new("ACME").unwrap();
        let mut store = SqliteStore::new_in_memory().unwrap();
        let bars: Vec<PriceBar> = (0..20)
            .map(|i| {
                let price = 100.0 + i as f64;
                PriceBar::new(
                    symbol.clone(),
                    date(2024, 1, 16) - Duration::days(19 - i),
                    price,
                    price,
                    price,
                    price,
                    1_000.0,
                )
            })
            .collect();
        store.save_bars(&bars).unwrap();
        store
            .connection()
            .execute(
                "INSERT INTO stock_prices (symbol, date, open_price, close_price, high_price, low_price, volume)
                 VALUES ('ACME', 'not-a-date', 1.0, 1.0, 1.0, 1.0, 1.0)",
                [],
            )
            .unwrap();
        let fetcher = RecordingFetcher::returning(Ok(Vec::new()));

        let mut engine = StatisticsEngine::new(store, fetcher, FreshnessReconciler::new(New_York));
        let result = engine.analyze_at(&symbol, wednesday_afternoon()).unwrap();

        assert_eq!(engine.fetcher().calls(), vec![(None, date(2024, 1, 16))]);
        let trend = result
            .get(Category::Close, &AnalysisType::Trend, Period::Month)
            .unwrap();
        assert!((trend - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_stored_date() {
        let symbol = Symbol::new("ACME").unwrap();
        assert_eq!(
            parse_stored_date(&symbol, Some("2024-01-16".to_string())),
            Some(date(2024, 1, 16))
        );
        assert_eq!(parse_stored_date(&symbol, Some("16/01/2024".to_string())), None);
        assert_eq!(parse_stored_date(&symbol, None), None);
    }
}
