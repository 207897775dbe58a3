//! The fixed MT4 timeframe ladder.
//!
//! MT4 stores one history file per (symbol, period) and only knows nine
//! periods, identified on disk by their length in minutes.
//!
//! ```
//! use history_source::models::period::Period;
//!
//! let p: Period = "H4".parse().unwrap();
//! assert_eq!(p.minutes(), 240);
//! assert_eq!(Period::from_minutes(240), Some(p));
//! ```

use std::{fmt, str::FromStr};

use chrono::{Datelike, Timelike};
use thiserror::Error;

use crate::fxt::{self, SECS_PER_DAY, SECS_PER_MINUTE};

/// Error returned when a string names no MT4 period.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown period: {0}")]
pub struct PeriodError(pub String);

/// One of the nine MT4 timeframes, ordered from shortest to longest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Period {
    /// 1 minute
    M1,
    /// 5 minutes
    M5,
    /// 15 minutes
    M15,
    /// 30 minutes
    M30,
    /// 1 hour
    H1,
    /// 4 hours
    H4,
    /// 1 day
    D1,
    /// 1 week
    W1,
    /// 1 month
    MN1,
}

impl Period {
    /// All periods in ascending order.
    pub const ALL: [Period; 9] = [
        Period::M1,
        Period::M5,
        Period::M15,
        Period::M30,
        Period::H1,
        Period::H4,
        Period::D1,
        Period::W1,
        Period::MN1,
    ];

    /// Length in minutes, as used in `.hst` file names and headers.
    pub const fn minutes(self) -> u32 {
        match self {
            Period::M1 => 1,
            Period::M5 => 5,
            Period::M15 => 15,
            Period::M30 => 30,
            Period::H1 => 60,
            Period::H4 => 240,
            Period::D1 => 1440,
            Period::W1 => 10080,
            Period::MN1 => 43200,
        }
    }

    /// Position within [`Period::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short display name (`M1`, `H4`, `MN1`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            Period::M1 => "M1",
            Period::M5 => "M5",
            Period::M15 => "M15",
            Period::M30 => "M30",
            Period::H1 => "H1",
            Period::H4 => "H4",
            Period::D1 => "D1",
            Period::W1 => "W1",
            Period::MN1 => "MN1",
        }
    }

    /// Whether `time` is the open time of a bar of this period.
    ///
    /// Weekly bars open on Sunday 00:00, monthly bars on the 1st at 00:00;
    /// all shorter periods are multiples of their length since the epoch.
    pub fn is_aligned(self, time: i64) -> bool {
        match self {
            // 1970-01-04 was a Sunday
            Period::W1 => (time - 3 * SECS_PER_DAY).rem_euclid(7 * SECS_PER_DAY) == 0,
            Period::MN1 => fxt::datetime(time).is_some_and(|dt| dt.day() == 1 && dt.num_seconds_from_midnight() == 0),
            _ => time.rem_euclid(i64::from(self.minutes()) * SECS_PER_MINUTE) == 0,
        }
    }

    /// Looks up a period by its length in minutes.
    pub fn from_minutes(minutes: u32) -> Option<Period> {
        Period::ALL.into_iter().find(|p| p.minutes() == minutes)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts a period name (`"m15"`, `"D1"`) or a minute count (`"15"`).
impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(minutes) = s.parse::<u32>() {
            return Period::from_minutes(minutes).ok_or_else(|| PeriodError(s.to_string()));
        }
        Period::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| PeriodError(s.to_string()))
    }
}
