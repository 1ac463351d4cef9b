//! Stateless metric functions over windowed series.
//!
//! Every function returns `None` when its input cannot support the statistic;
//! callers store that as an absent value rather than failing the run.

use crate::analytics::result::AnalysisType;
use crate::analytics::window::Window;

/// Arithmetic mean, or `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation of the non-NaN values.
pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    let valid_values: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    let mean = mean(&valid_values)?;

    let n = valid_values.len() as f64;
    let variance = valid_values
        .iter()
        .map(|&value| (value - mean).powi(2))
        .sum::<f64>()
        / n;
    Some(variance.sqrt())
}

/// Least-squares slope of `y` against `x`.
fn least_squares_slope(points: impl Iterator<Item = (f64, f64)> + Clone) -> Option<f64> {
    let n = points.clone().count();
    if n < 2 {
        return None;
    }

    let n = n as f64;
    let (sum_x, sum_y) = points
        .clone()
        .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
    let mean_x = sum_x / n;
    let mean_y = sum_y / n;

    let (covariance, variance) = points.fold((0.0, 0.0), |(cov, var), (x, y)| {
        let dx = x - mean_x;
        (cov + dx * (y - mean_y), var + dx * dx)
    });

    if variance == 0.0 {
        return None;
    }
    Some(covariance / variance)
}

/// Linear slope of value vs. index, fit over window indices `1..n`.
///
/// Index 0 is the padding point admitted by the window filter and is left out
/// of the fit.
pub fn trend(window: Option<Window<'_>>) -> Option<f64> {
    let values = window?.values();
    least_squares_slope(
        values
            .iter()
            .enumerate()
            .skip(1)
            .map(|(index, &value)| (index as f64, value)),
    )
}

/// Population standard deviation of day-over-day deltas across the window.
pub fn volatility(window: Option<Window<'_>>) -> Option<f64> {
    let values = window?.values();
    let deltas: Vec<f64> = values.windows(2).map(|pair| pair[1] - pair[0]).collect();
    population_std_dev(&deltas)
}

/// Mean of daily percentage changes, reaching one point before the window.
///
/// When the series has no point before the window, only in-window pairs are
/// used. A zero previous value yields a non-finite return.
pub fn avg_daily_return(window: Option<Window<'_>>) -> Option<f64> {
    let values = window?.with_leading_point();
    let returns: Vec<f64> = values
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) / pair[0])
        .collect();
    mean(&returns)
}

/// Percentage change from the first to the last in-window value.
///
/// Not adjusted for dividends or splits.
pub fn total_return(window: Option<Window<'_>>) -> Option<f64> {
    let values = window?.values();
    let first = *values.first()?;
    let last = *values.last()?;
    Some((last - first) / first * 100.0)
}

/// Pearson correlation of two equal-length series.
///
/// Returns `None` for mismatched lengths, fewer than two points, or a
/// constant series.
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let mean_x = mean(x)?;
    let mean_y = mean(y)?;

    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator == 0.0 || denominator.is_nan() {
        return None;
    }
    Some((covariance / denominator).clamp(-1.0, 1.0))
}

/// Per-price-field metrics computed at each period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceMetric {
    Trend,
    Volatility,
    AvgDailyReturn,
}

impl PriceMetric {
    pub const ALL: [PriceMetric; 3] = [
        PriceMetric::Trend,
        PriceMetric::Volatility,
        PriceMetric::AvgDailyReturn,
    ];

    pub fn compute(&self, window: Option<Window<'_>>) -> Option<f64> {
        match self {
            PriceMetric::Trend => trend(window),
            PriceMetric::Volatility => volatility(window),
            PriceMetric::AvgDailyReturn => avg_daily_return(window),
        }
    }

    pub fn analysis_type(&self) -> AnalysisType {
        match self {
            PriceMetric::Trend => AnalysisType::Trend,
            PriceMetric::Volatility => AnalysisType::Volatility,
            PriceMetric::AvgDailyReturn => AnalysisType::AvgDailyReturn,
        }
    }
}

/// Ratio of average daily return to volatility.
///
/// Zero volatility produces a non-finite ratio instead of an error.
pub fn risk_reward_ratio(avg_daily_return: Option<f64>, volatility: Option<f64>) -> Option<f64> {
    Some(avg_daily_return? / volatility?)
}
