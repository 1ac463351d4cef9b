//! Per-symbol statistics
//!
//! Stateless metric functions over trailing date windows, the peer
//! correlation selector, and the engine that composes them into a
//! [`CombinedResult`] for storage.

pub mod correlation;
pub mod engine;
pub mod metrics;
pub mod result;
pub mod window;

pub use correlation::{close_price_correlation, top_by_dollar_volume, TopStock};
pub use engine::{compute_statistics, compute_statistics_for_bars, AnalysisError, StatisticsEngine};
pub use metrics::{
    avg_daily_return, pearson_correlation, risk_reward_ratio, total_return, trend, volatility,
    PriceMetric,
};
pub use result::{
    AnalysisResult, AnalysisType, Category, CombinedResult, MetricEntry, ParseAnalysisTypeError,
    Period,
};
pub use window::{windowed, Window};
