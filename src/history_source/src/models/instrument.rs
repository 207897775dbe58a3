//! Instrument metadata consumed by the history pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::calendar;

/// Instrument class. Selects the storage subdirectory and holiday rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    /// Currency pairs.
    Forex,
    /// Precious metals, closed on Good Friday.
    Metals,
    /// Indexes computed from other instruments.
    Synthetic,
}

impl InstrumentKind {
    /// Storage subdirectory name.
    pub const fn dir_name(self) -> &'static str {
        match self {
            InstrumentKind::Forex => "forex",
            InstrumentKind::Metals => "metals",
            InstrumentKind::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A tradeable (or synthesized) instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    /// Upper-case symbol, at most 12 characters.
    pub name: String,
    /// Instrument class.
    pub kind: InstrumentKind,
    /// Number of fractional price digits.
    pub digits: u32,
    /// Free-form description.
    pub description: Option<String>,
    /// 00:00 FXT of the first day with stored M1 history, if known.
    pub history_m1_start: Option<i64>,
    /// 00:00 FXT of the last day with stored M1 history, if known.
    pub history_m1_end: Option<i64>,
}

impl Instrument {
    /// Creates an instrument without history metadata.
    pub fn new(name: impl Into<String>, kind: InstrumentKind, digits: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            digits,
            description: None,
            history_m1_start: None,
            history_m1_end: None,
        }
    }

    /// Smallest price increment, `10^-digits`.
    pub fn point(&self) -> f64 {
        1.0 / 10f64.powi(self.digits as i32)
    }

    /// Whether `day` (FXT) is a trading day for this instrument.
    pub fn is_trading_day(&self, day: i64) -> bool {
        calendar::is_trading_day(self.kind, day)
    }
}
