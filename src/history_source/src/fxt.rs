//! FXT ("forex time") helpers.
//!
//! FXT is the trading-server clock used by every stored bar: New York wall
//! time shifted by +7 hours, so that the trading week starts at Monday 00:00
//! and every trading day is exactly one calendar day long, DST included.
//!
//! What this module provides:
//! - [`to_fxt`] / [`fxt_timestamp`] / [`fxt_now`]: convert UTC instants to FXT.
//! - [`day_start`], [`weekday`], [`is_weekend`]: calendar math on FXT seconds.
//! - [`format_day`], [`format_month`], [`format_time`]: the textual forms used in logs.
//!
//! FXT timestamps are plain `i64` seconds where the FXT wall time is read as if
//! it were UTC. All helpers below assume that convention.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono_tz::America::New_York;

/// Number of seconds in a minute.
pub const SECS_PER_MINUTE: i64 = 60;
/// Number of seconds in a day.
pub const SECS_PER_DAY: i64 = 24 * 60 * SECS_PER_MINUTE;
/// FXT offset from New York wall time.
pub const FXT_OFFSET_HOURS: i64 = 7;

/// Converts a UTC instant to FXT wall time.
///
/// Example:
/// - 2024-01-15T12:00Z is 07:00 EST, so 14:00 FXT.
/// - 2024-07-15T12:00Z is 08:00 EDT, so 15:00 FXT.
pub fn to_fxt(utc: DateTime<Utc>) -> NaiveDateTime {
    utc.with_timezone(&New_York).naive_local() + Duration::hours(FXT_OFFSET_HOURS)
}

/// FXT seconds for a UTC instant.
pub fn fxt_timestamp(utc: DateTime<Utc>) -> i64 {
    to_fxt(utc).and_utc().timestamp()
}

/// Current time in FXT seconds.
pub fn fxt_now() -> i64 {
    fxt_timestamp(Utc::now())
}

/// 00:00 of the day containing `ts`.
pub fn day_start(ts: i64) -> i64 {
    ts - ts.rem_euclid(SECS_PER_DAY)
}

/// FXT seconds of 00:00 on a calendar date.
pub fn date_start(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// FXT timestamp as a naive date-time, `None` when out of chrono's range.
pub fn datetime(ts: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.naive_utc())
}

/// Day of week of an FXT timestamp.
pub fn weekday(ts: i64) -> Weekday {
    // 1970-01-01 was a Thursday
    match (ts.div_euclid(SECS_PER_DAY) + 3).rem_euclid(7) {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

/// Whether an FXT timestamp falls on a Saturday or Sunday.
pub fn is_weekend(ts: i64) -> bool {
    matches!(weekday(ts), Weekday::Sat | Weekday::Sun)
}

/// `Mon, 03-Jan-2022`
pub fn format_day(ts: i64) -> String {
    format_with(ts, "%a, %d-%b-%Y")
}

/// `Jan-2022`
pub fn format_month(ts: i64) -> String {
    format_with(ts, "%b-%Y")
}

/// `2022.01.03 09:30`
pub fn format_time(ts: i64) -> String {
    format_with(ts, "%Y.%m.%d %H:%M")
}

/// Calendar month number (1-12) of an FXT timestamp.
pub fn month(ts: i64) -> u32 {
    datetime(ts).map(|dt| dt.month()).unwrap_or(0)
}

fn format_with(ts: i64, fmt: &str) -> String {
    match datetime(ts) {
        Some(dt) => dt.format(fmt).to_string(),
        None => ts.to_string(),
    }
}
