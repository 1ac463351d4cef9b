pub mod symbol;
pub mod price_bar;
pub mod calendar;
pub mod store;
pub mod sqlite_store;
pub mod yahoo_finance;
pub mod freshness;
pub mod analytics;
pub mod config;
pub mod server;

pub use symbol::{Symbol, SymbolError};
pub use price_bar::{BarSeries, PriceBar};
pub use calendar::{last_trading_day, last_trading_day_at};
pub use store::{InMemoryStore, PriceStore, ResultStore, StoreError};
pub use sqlite_store::SqliteStore;
pub use yahoo_finance::{DownloadError, DownloaderConfig, YahooFinanceDownloader};
pub use freshness::{FreshnessReconciler, PriceFetcher, QUERY_FLOOR_DAYS};
pub use analytics::{
    compute_statistics,
    AnalysisError,
    AnalysisResult,
    AnalysisType,
    Category,
    CombinedResult,
    MetricEntry,
    Period,
    StatisticsEngine,
};
pub use config::{AppConfig, ConfigError, ServerConfig};
pub use server::{run_server, ApiError, AppState};
