//! Canonical in-memory representation of one MT4 bar.
//!
//! All sources (Rosatrader bar files, synthesized indexes, stored `.hst`
//! files) produce and consume this struct, so a day of bars can travel from
//! any provider to the history files unchanged.

use serde::{Deserialize, Serialize};

/// A single OHLC bar.
///
/// `time` is the bar's open time in seconds since the epoch, expressed in FXT
/// (see [`crate::fxt`]). Prices are already rounded to the instrument's digits.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time, FXT seconds.
    pub time: i64,
    /// Opening price.
    pub open: f64,
    /// Highest price during the bar interval.
    pub high: f64,
    /// Lowest price during the bar interval.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Tick count (real or synthetic).
    pub ticks: u64,
}

impl Bar {
    /// Builds a bar from its parts.
    pub const fn new(time: i64, open: f64, high: f64, low: f64, close: f64, ticks: u64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            ticks,
        }
    }

    /// Whether `low <= open, close <= high` holds.
    pub fn is_consistent(&self) -> bool {
        self.low <= self.open.min(self.close) && self.high >= self.open.max(self.close)
    }
}

/// Rounds a price to `digits` fractional digits.
pub fn round_price(value: f64, digits: u32) -> f64 {
    let scale = 10f64.powi(digits as i32);
    (value * scale).round() / scale
}

/// Converts a price to its integer point representation, `round(value / point)`.
pub fn to_points(value: f64, point: f64) -> i64 {
    (value / point).round() as i64
}

/// Whether `bars` is ordered by strictly increasing time.
pub fn is_strictly_increasing(bars: &[Bar]) -> bool {
    bars.windows(2).all(|w| w[0].time < w[1].time)
}
