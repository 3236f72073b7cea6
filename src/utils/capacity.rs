use chrono::{Datelike, NaiveDate, Weekday};

const HOURS_PER_WORKDAY: i64 = 8;
const MIN_STANDARD_HOURS: i64 = 1;

/// Canonical full-time hours for a calendar month: weekday count times an
/// eight-hour day. Deterministic per (year, month); holidays are not
/// modeled.
pub fn standard_month_hours(year: i32, month: u32) -> i64 {
    let mut day = match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(date) => date,
        None => return 0,
    };
    let mut weekdays = 0i64;
    while day.month() == month {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            weekdays += 1;
        }
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    weekdays * HOURS_PER_WORKDAY
}

/// Floors a standard-capacity value at one hour so FTE division can never
/// hit zero. Non-positive input counts as an input anomaly, not an error.
pub fn effective_standard(raw: i64) -> i64 {
    raw.max(MIN_STANDARD_HOURS)
}
