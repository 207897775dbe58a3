#![allow(dead_code)]

use std::collections::HashMap;

use chrono::NaiveDate;
use history_source::{
    fxt,
    models::{
        bar::Bar,
        instrument::{Instrument, InstrumentKind},
    },
    providers::{InstrumentRegistry, ProviderError},
};

/// In-memory registry: instruments plus per-day M1 bars.
#[derive(Default)]
pub struct FakeRegistry {
    pub instruments: HashMap<String, Instrument>,
    pub bars: HashMap<(String, i64), Vec<Bar>>,
}

impl FakeRegistry {
    pub fn add(&mut self, name: &str, digits: u32, start: Option<i64>) {
        let mut inst = Instrument::new(name, InstrumentKind::Forex, digits);
        inst.history_m1_start = start;
        self.instruments.insert(name.to_string(), inst);
    }

    pub fn put(&mut self, name: &str, day: i64, bars: Vec<Bar>) {
        self.bars.insert((name.to_string(), day), bars);
    }
}

impl InstrumentRegistry for FakeRegistry {
    fn find(&self, name: &str) -> Option<Instrument> {
        self.instruments.get(name).cloned()
    }

    fn history_start_m1(&self, instrument: &Instrument) -> Result<Option<i64>, ProviderError> {
        Ok(instrument.history_m1_start)
    }

    fn history_end_m1(&self, instrument: &Instrument) -> Result<Option<i64>, ProviderError> {
        Ok(instrument.history_m1_end)
    }

    fn history_m1(&self, instrument: &Instrument, day: i64) -> Result<Vec<Bar>, ProviderError> {
        Ok(self
            .bars
            .get(&(instrument.name.clone(), day))
            .cloned()
            .unwrap_or_default())
    }
}

pub fn day(y: i32, m: u32, d: u32) -> i64 {
    fxt::date_start(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

/// Flat-ish minute bars: open and close differ by `drift`.
pub fn minute_bars(day: i64, count: usize, base: f64, drift: f64) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let open = base + drift * i as f64;
            let close = open + drift;
            Bar::new(
                day + 60 * i as i64,
                open,
                open.max(close),
                open.min(close),
                close,
                1,
            )
        })
        .collect()
}
