//! Bar sources for MT4 history maintenance.
//!
//! What this crate provides:
//! - [`models`]: the in-memory [`Bar`](models::bar::Bar), the MT4
//!   [`Period`](models::period::Period) ladder and the
//!   [`Instrument`](models::instrument::Instrument) description.
//! - [`fxt`] and [`calendar`]: FXT ("forex time") conversion and the trading-day
//!   calendar used to decide which days carry bars.
//! - [`catalog`]: normalization of `[instruments.*]` configuration tables into
//!   a registry of instruments.
//! - [`providers`]: the [`HistoryProvider`](providers::HistoryProvider) and
//!   [`InstrumentRegistry`](providers::InstrumentRegistry) seams plus the
//!   Rosatrader M1 bar-file reader.
//! - [`synthetic`]: the synthesizer that derives index instruments such as
//!   `USDLFX` from the minute bars of their components.

pub mod calendar;
pub mod catalog;
pub mod errors;
pub mod fxt;
pub mod models;
pub mod providers;
pub mod synthetic;
