use crate::freshness::PriceFetcher;
use crate::price_bar::PriceBar;
use crate::symbol::Symbol;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

/// Configuration for Yahoo Finance downloader
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Retries after a network failure or 5xx response (default: 3)
    pub max_retries: u32,
    /// Pause between retries in milliseconds (default: 500)
    pub retry_delay_ms: u64,
    /// Request timeout in seconds (default: 30)
    pub timeout_seconds: u64,
    /// History fetched when no start date is given (default: 90 days)
    pub default_history_days: i64,
    /// User-Agent header; the chart endpoint rejects the reqwest default
    pub user_agent: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        DownloaderConfig {
            max_retries: 3,
            retry_delay_ms: 500,
            timeout_seconds: 30,
            default_history_days: 90,
            user_agent: "Mozilla/5.0".to_string(),
        }
    }
}

/// Yahoo Finance daily-bar downloader.
///
/// Uses the blocking client: the analysis core is synchronous and callers in
/// async contexts run it on a blocking thread.
#[derive(Debug)]
pub struct YahooFinanceDownloader {
    client: Client,
    config: DownloaderConfig,
}

impl YahooFinanceDownloader {
    /// Creates a new Yahoo Finance downloader with default configuration.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_config(DownloaderConfig::default())
    }

    /// Creates a new Yahoo Finance downloader with custom configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_config(config: DownloaderConfig) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DownloadError::ClientCreation(e.to_string()))?;

        Ok(YahooFinanceDownloader { client, config })
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Fetches daily bars for `symbol` between `start_date` and `end_date`,
    /// both inclusive.
    ///
    /// A missing start date requests `default_history_days` of history.
    ///
    /// # Errors
    /// Returns `DownloadError` if the request fails after retries, the API
    /// answers with an error, or the payload cannot be parsed.
    pub fn fetch_daily_bars(
        &self,
        symbol: &Symbol,
        start_date: Option<NaiveDate>,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, DownloadError> {
        let start_date = match start_date {
            Some(date) => date,
            None => default_start(end_date, self.config.default_history_days)?,
        };

        let period1 = start_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| DownloadError::InvalidDate(start_date.to_string()))?
            .and_utc()
            .timestamp();
        let period2 = end_date
            .and_hms_opt(23, 59, 59)
            .ok_or_else(|| DownloadError::InvalidDate(end_date.to_string()))?
            .and_utc()
            .timestamp();

        info!(
            "Fetching daily bars for {} from {} to {}",
            symbol, start_date, end_date
        );

        let url = format!("{}/{}", CHART_URL, symbol);
        let query = [
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
            ("interval", "1d".to_string()),
            ("events", "history".to_string()),
        ];

        let envelope = self.get_with_retries(&url, &query)?;
        bars_from_envelope(symbol, envelope)
    }

    fn get_with_retries(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<ChartEnvelope, DownloadError> {
        let mut attempt = 0;
        loop {
            let outcome = self
                .client
                .get(url)
                .query(query)
                .send()
                .map_err(|e| DownloadError::Network(e.to_string()))
                .and_then(|response| {
                    let status = response.status();
                    if !status.is_success() {
                        return Err(DownloadError::Api {
                            status: status.as_u16(),
                            message: status.canonical_reason().unwrap_or("Unknown error").to_string(),
                        });
                    }
                    response
                        .json::<ChartEnvelope>()
                        .map_err(|e| DownloadError::Parse(e.to_string()))
                });

            match outcome {
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!("Request to {} failed ({}), retry {}", url, e, attempt);
                    thread::sleep(Duration::from_millis(self.config.retry_delay_ms));
                }
                other => return other,
            }
        }
    }
}

/// `end_date` minus `history_days`, rejecting non-positive or out-of-range spans.
fn default_start(end_date: NaiveDate, history_days: i64) -> Result<NaiveDate, DownloadError> {
    let invalid = || DownloadError::InvalidDate(format!("{} days before {}", history_days, end_date));
    if history_days < 1 {
        return Err(invalid());
    }
    ChronoDuration::try_days(history_days)
        .and_then(|span| end_date.checked_sub_signed(span))
        .ok_or_else(invalid)
}

impl PriceFetcher for YahooFinanceDownloader {
    fn fetch(
        &self,
        symbol: &Symbol,
        start_date: Option<NaiveDate>,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, DownloadError> {
        self.fetch_daily_bars(symbol, start_date, end_date)
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn column(values: &[Option<f64>], index: usize) -> Option<f64> {
    values.get(index).copied().flatten()
}

/// Parses a v8 chart payload into daily bars.
///
/// Rows with any missing field (Yahoo emits `null` for halted sessions) are
/// skipped. Dates are the UTC calendar date of each bar's timestamp.
pub fn parse_chart_response(symbol: &Symbol, body: &str) -> Result<Vec<PriceBar>, DownloadError> {
    let envelope: ChartEnvelope =
        serde_json::from_str(body).map_err(|e| DownloadError::Parse(e.to_string()))?;
    bars_from_envelope(symbol, envelope)
}

fn bars_from_envelope(symbol: &Symbol, envelope: ChartEnvelope) -> Result<Vec<PriceBar>, DownloadError> {
    if let Some(error) = envelope.chart.error {
        return Err(DownloadError::Api {
            status: 200,
            message: format!("{}: {}", error.code, error.description),
        });
    }

    let Some(result) = envelope.chart.result.and_then(|results| results.into_iter().next()) else {
        return Ok(Vec::new());
    };
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (index, &timestamp) in result.timestamp.iter().enumerate() {
        let date = DateTime::<Utc>::from_timestamp(timestamp, 0)
            .ok_or_else(|| DownloadError::Parse(format!("invalid timestamp {}", timestamp)))?
            .date_naive();

        let fields = (
            column(&quote.open, index),
            column(&quote.close, index),
            column(&quote.high, index),
            column(&quote.low, index),
            column(&quote.volume, index),
        );
        match fields {
            (Some(open), Some(close), Some(high), Some(low), Some(volume)) => {
                bars.push(PriceBar::new(symbol.clone(), date, open, close, high, low, volume));
            }
            _ => debug!("Skipping {} bar on {} with missing fields", symbol, date),
        }
    }

    Ok(bars)
}

/// Errors that can occur during Yahoo Finance data downloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("Client creation error: {0}")]
    ClientCreation(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
}

impl DownloadError {
    fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Network(_) => true,
            DownloadError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
