//! Trading-day calendar.
//!
//! A day is a trading day unless it falls on a weekend or on a designated
//! holiday. New Year's Day and Christmas close every market; metals also stay
//! closed on Good Friday.

use chrono::{Datelike, NaiveDate};

use crate::{
    fxt::{self, datetime},
    models::instrument::InstrumentKind,
};

/// Whether `day` (any FXT time within the day) is a trading day for `kind`.
pub fn is_trading_day(kind: InstrumentKind, day: i64) -> bool {
    !fxt::is_weekend(day) && !is_holiday(kind, day)
}

/// Whether `day` is a designated holiday for `kind`.
pub fn is_holiday(kind: InstrumentKind, day: i64) -> bool {
    let Some(date) = datetime(day).map(|dt| dt.date()) else {
        return false;
    };
    match (date.month(), date.day()) {
        (1, 1) | (12, 25) => return true,
        _ => {}
    }
    kind == InstrumentKind::Metals && Some(date) == good_friday(date.year())
}

/// Easter Sunday of `year` (Gregorian calendar, anonymous computus).
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

/// Good Friday of `year`.
pub fn good_friday(year: i32) -> Option<NaiveDate> {
    easter_sunday(year).and_then(|d| d.checked_sub_days(chrono::Days::new(2)))
}
