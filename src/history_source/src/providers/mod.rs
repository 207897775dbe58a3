//! Provider abstraction for M1 bar sources.
//!
//! Two seams live here:
//! - [`HistoryProvider`]: yields one day of bars for one instrument. Implemented
//!   by [`rost::RostHistory`] for stored instruments and by
//!   [`Synthesizer`](crate::synthetic::Synthesizer) for computed ones.
//! - [`InstrumentRegistry`]: resolves instrument names and serves the stored M1
//!   history of any known instrument. The synthesizer uses it to fetch its
//!   components.
//!
//! Both traits are object safe, so callers can pick a provider per instrument at
//! runtime (`&mut dyn HistoryProvider`).

pub mod errors;
pub mod rost;

pub use errors::ProviderError;

use crate::models::{bar::Bar, instrument::Instrument, period::Period};

/// Source of bars for a single instrument.
pub trait HistoryProvider {
    /// Bars of `period` for the FXT day starting at `day`.
    ///
    /// An empty result means the day's history is not available.
    fn history(&mut self, period: Period, day: i64) -> Result<Vec<Bar>, ProviderError>;

    /// 00:00 FXT of the first day with available history, `None` if there is none.
    fn history_start(&mut self, period: Period) -> Result<Option<i64>, ProviderError>;

    /// 00:00 FXT of the last day with available history, `None` if unknown.
    fn history_end(&mut self, period: Period) -> Result<Option<i64>, ProviderError>;
}

/// Lookup of instruments and their stored M1 history.
pub trait InstrumentRegistry {
    /// Finds an instrument by name (case-insensitive).
    fn find(&self, name: &str) -> Option<Instrument>;

    /// 00:00 FXT of the first day with stored M1 history.
    fn history_start_m1(&self, instrument: &Instrument) -> Result<Option<i64>, ProviderError>;

    /// 00:00 FXT of the last day with stored M1 history.
    fn history_end_m1(&self, instrument: &Instrument) -> Result<Option<i64>, ProviderError>;

    /// Stored M1 bars of `instrument` for the FXT day starting at `day`.
    ///
    /// An empty result means no history is stored for that day.
    fn history_m1(&self, instrument: &Instrument, day: i64) -> Result<Vec<Bar>, ProviderError>;
}
