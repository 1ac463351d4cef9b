//! Statistics engine: reconcile, load, compute, correlate, persist.

use crate::analytics::correlation::{
    close_price_correlation, top_by_dollar_volume, DEFAULT_CORRELATION_BARS,
};
use crate::analytics::metrics::{mean, population_std_dev, risk_reward_ratio, total_return, PriceMetric};
use crate::analytics::result::{AnalysisType, Category, CombinedResult, Period};
use crate::analytics::window::windowed;
use crate::freshness::{FreshnessReconciler, PriceFetcher};
use crate::price_bar::{BarSeries, PriceBar};
use crate::store::{PriceStore, ResultStore, StoreError};
use crate::symbol::Symbol;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::{info, warn};

/// Failure of an `analyze` run for one symbol.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

/// Computes every price and volume metric for an ascending bar series.
///
/// Correlation is not included; it needs the other tracked symbols and is
/// added by [`StatisticsEngine::analyze`].
pub fn compute_statistics(symbol: Symbol, series: &BarSeries) -> CombinedResult {
    let mut result = CombinedResult::new(symbol);

    for category in Category::PRICES {
        let values = series.values(category);
        for metric in PriceMetric::ALL {
            for period in Period::ALL {
                let window = windowed(values, &series.dates, period.lookback_days());
                result.push(category, metric.analysis_type(), period, metric.compute(window));
            }
        }

        if category == Category::Close {
            add_close_returns(&mut result, series);
        }
    }

    add_volume_statistics(&mut result, series);
    result
}

fn add_close_returns(result: &mut CombinedResult, series: &BarSeries) {
    for period in Period::ALL {
        let window = windowed(&series.close, &series.dates, period.lookback_days());
        result.push(
            Category::Close,
            AnalysisType::TotalReturn,
            period,
            total_return(window),
        );
    }

    for period in Period::ALL {
        let ratio = risk_reward_ratio(
            result.get(Category::Close, &AnalysisType::AvgDailyReturn, period),
            result.get(Category::Close, &AnalysisType::Volatility, period),
        );
        result.push(Category::Close, AnalysisType::RiskRewardRatio, period, ratio);
    }
}

/// Volume uses one 30-day date window, then re-slices it by entry count for
/// each bucket. With fewer than 30 dated entries the 30 bucket simply covers
/// what the window holds.
fn add_volume_statistics(result: &mut CombinedResult, series: &BarSeries) {
    let window = windowed(&series.volume, &series.dates, Period::Month.lookback_days());

    for period in Period::ALL {
        let slice = window.map(|window| window.tail(period.tail_count()));
        result.push(
            Category::Volume,
            AnalysisType::Average,
            period,
            slice.and_then(mean),
        );
        result.push(
            Category::Volume,
            AnalysisType::StdDev,
            period,
            slice.and_then(population_std_dev),
        );
    }
}

/// Entry point for per-symbol analysis.
///
/// Owns the storage backend and the price source; each call to
/// [`analyze`](Self::analyze) is self-contained and synchronous.
#[derive(Debug)]
pub struct StatisticsEngine<S, F> {
    store: S,
    fetcher: F,
    reconciler: FreshnessReconciler,
    correlation_bars: usize,
}

impl<S, F> StatisticsEngine<S, F>
where
    S: PriceStore + ResultStore,
    F: PriceFetcher,
{
    pub fn new(store: S, fetcher: F, reconciler: FreshnessReconciler) -> Self {
        StatisticsEngine {
            store,
            fetcher,
            reconciler,
            correlation_bars: DEFAULT_CORRELATION_BARS,
        }
    }

    /// Sets how many recent bars rank and correlate peers.
    pub fn with_correlation_bars(mut self, correlation_bars: usize) -> Self {
        self.correlation_bars = correlation_bars;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Analyzes `symbol` as of the current time.
    pub fn analyze(&mut self, symbol: &Symbol) -> Result<CombinedResult, AnalysisError> {
        self.analyze_at(symbol, Utc::now())
    }

    /// Brings `symbol` up to date, computes its statistics and persists them.
    ///
    /// Metrics without enough history are returned (and skipped in storage)
    /// as absent values. Storage errors abort this symbol's run only.
    pub fn analyze_at(
        &mut self,
        symbol: &Symbol,
        now: DateTime<Utc>,
    ) -> Result<CombinedResult, AnalysisError> {
        let floor = self
            .reconciler
            .ensure_fresh_at(&mut self.store, &self.fetcher, symbol, now)?;

        let bars = self.store.load_since(symbol, floor)?;
        if bars.len() < 2 {
            warn!(
                "Only {} bars for {} since {}; metrics will be absent",
                bars.len(),
                symbol,
                floor
            );
        }

        let series = BarSeries::from_bars(&bars);
        let mut result = compute_statistics(symbol.clone(), &series);
        self.add_correlation(&mut result, symbol, &series)?;

        let written = self.store.persist_results(&result, now)?;
        info!(
            "Persisted {} of {} analysis values for {}",
            written,
            result.entries.len(),
            symbol
        );

        Ok(result)
    }

    fn add_correlation(
        &self,
        result: &mut CombinedResult,
        symbol: &Symbol,
        series: &BarSeries,
    ) -> Result<(), StoreError> {
        let Some(top) = top_by_dollar_volume(&self.store, symbol, self.correlation_bars)? else {
            info!("No other tracked symbols to correlate with {}", symbol);
            return Ok(());
        };

        if &top.symbol == symbol {
            info!("{} is its own top stock by dollar volume; skipping correlation", symbol);
            return Ok(());
        }

        let value = windowed(&series.close, &series.dates, Period::Month.lookback_days())
            .and_then(|window| close_price_correlation(window.values(), &top.closes));
        result.push(
            Category::Close,
            AnalysisType::CorrelationCoeff(top.symbol),
            Period::Month,
            value,
        );
        Ok(())
    }

    /// Fetches `symbol`'s default history and stores it, without analysis.
    ///
    /// # Returns
    /// The number of newly stored bars; zero when the source had nothing.
    pub fn collect(&mut self, symbol: &Symbol, end_date: NaiveDate) -> Result<usize, StoreError> {
        match self.fetcher.fetch(symbol, None, end_date) {
            Ok(bars) if bars.is_empty() => {
                warn!("No data returned for {}", symbol);
                Ok(0)
            }
            Ok(bars) => self.store.save_bars(&bars),
            Err(e) => {
                warn!("Failed to collect data for {}: {}", symbol, e);
                Ok(0)
            }
        }
    }
}

/// Convenience for callers holding bars rather than a store.
pub fn compute_statistics_for_bars(symbol: Symbol, bars: &[PriceBar]) -> CombinedResult {
    compute_statistics(symbol, &BarSeries::from_bars(bars))
}
