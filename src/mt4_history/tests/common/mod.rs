#![allow(dead_code)]

use std::collections::HashMap;

use chrono::NaiveDate;
use history_source::{
    fxt,
    models::{bar::Bar, period::Period},
    providers::{HistoryProvider, ProviderError},
};
use mt4_history::updater::CancellationToken;
use tempfile::TempDir;

pub fn day(y: i32, m: u32, d: u32) -> i64 {
    fxt::date_start(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

pub fn bar(time: i64, close: f64) -> Bar {
    let open = close - 0.0001;
    Bar::new(time, open, close + 0.0002, open - 0.0002, close, 10)
}

/// `count` one-minute bars starting at `start`, with rising closes.
pub fn minute_bars(start: i64, count: usize, base: f64) -> Vec<Bar> {
    (0..count)
        .map(|i| bar(start + 60 * i as i64, base + 0.0001 * i as f64))
        .collect()
}

pub fn history_dir() -> TempDir {
    TempDir::new().unwrap()
}

/// In-memory provider with per-day bars and call bookkeeping.
#[derive(Default)]
pub struct FakeProvider {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub days: HashMap<i64, Vec<Bar>>,
    pub requested: Vec<i64>,
    /// Cancels the token after this many served days.
    pub cancel_after: Option<(usize, CancellationToken)>,
}

impl FakeProvider {
    pub fn with_days(start: i64, days: &[i64]) -> Self {
        let mut provider = Self {
            start: Some(start),
            ..Self::default()
        };
        for &d in days {
            provider.days.insert(d, minute_bars(d, 5, 1.1));
        }
        provider
    }
}

impl HistoryProvider for FakeProvider {
    fn history(&mut self, _period: Period, day: i64) -> Result<Vec<Bar>, ProviderError> {
        self.requested.push(day);
        if let Some((n, token)) = &self.cancel_after {
            if self.requested.len() >= *n {
                token.cancel();
            }
        }
        Ok(self.days.get(&day).cloned().unwrap_or_default())
    }

    fn history_start(&mut self, _period: Period) -> Result<Option<i64>, ProviderError> {
        Ok(self.start)
    }

    fn history_end(&mut self, _period: Period) -> Result<Option<i64>, ProviderError> {
        Ok(self.end)
    }
}
