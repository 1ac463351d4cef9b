//! Trailing date windows over `(value, date)` series.
//!
//! A window keeps a reference to the full series so metrics that need one
//! point of history before the window (daily returns) can reach it.

use chrono::{Duration, NaiveDate};

/// Minimum number of points a window must hold to support a delta.
pub const MIN_WINDOW_POINTS: usize = 2;

/// Trailing slice `series[start..]` selected by [`windowed`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window<'a> {
    series: &'a [f64],
    start: usize,
}

impl<'a> Window<'a> {
    /// Wraps the trailing `series[start..]`.
    ///
    /// Returns `None` when fewer than [`MIN_WINDOW_POINTS`] values remain.
    pub fn trailing(series: &'a [f64], start: usize) -> Option<Self> {
        if series.len().saturating_sub(start) < MIN_WINDOW_POINTS {
            return None;
        }
        Some(Window { series, start })
    }

    /// The in-window values.
    pub fn values(&self) -> &'a [f64] {
        &self.series[self.start..]
    }

    /// The in-window values plus the point just before the window, when the
    /// full series has one.
    pub fn with_leading_point(&self) -> &'a [f64] {
        &self.series[self.start.saturating_sub(1)..]
    }

    /// Offset of the first in-window value inside the full series.
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.series.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The last `count` in-window values (all of them when fewer exist).
    pub fn tail(&self, count: usize) -> &'a [f64] {
        let values = self.values();
        &values[values.len().saturating_sub(count)..]
    }
}

/// Selects the entries dated on or after `last date - (period_days + 1)`.
///
/// `dates` must be ascending and parallel to `values`. The extra day of
/// padding admits the point needed for the first in-period delta.
///
/// Returns `None` when the series has fewer than two dates, when fewer than two
/// entries fall inside the window, or when the slices are not parallel.
pub fn windowed<'a>(values: &'a [f64], dates: &[NaiveDate], period_days: i64) -> Option<Window<'a>> {
    if dates.len() < MIN_WINDOW_POINTS || values.len() != dates.len() {
        return None;
    }

    let last = *dates.last()?;
    let cutoff = last - Duration::days(period_days + 1);
    let start = dates.partition_point(|date| *date < cutoff);

    Window::trailing(values, start)
}
