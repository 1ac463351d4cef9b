//! Trading-day rule used as the upper bound of complete data.
//!
//! Only weekends are recognised; exchange holidays are not modelled.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Weekday};

/// Returns the most recent completed trading day before `reference`.
///
/// Saturdays and Sundays map to the preceding Friday; any other day maps to the
/// previous calendar day (so a Monday maps to the Sunday before it).
pub fn last_trading_day(reference: NaiveDate) -> NaiveDate {
    match reference.weekday() {
        Weekday::Sat => reference - Duration::days(1),
        Weekday::Sun => reference - Duration::days(2),
        _ => reference - Duration::days(1),
    }
}

/// [`last_trading_day`] for an instant, evaluated in the instant's own zone.
pub fn last_trading_day_at<Tz: TimeZone>(now: &DateTime<Tz>) -> NaiveDate {
    last_trading_day(now.date_naive())
}
