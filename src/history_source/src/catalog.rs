//! Instrument catalog: parsing shape, normalization, and registry.
//!
//! The catalog is the `[instruments.<NAME>]` part of the configuration file:
//!
//! ```toml
//! [instruments.eurusd]
//! type = "forex"
//! digits = 5
//!
//! [instruments.USDLFX]
//! type = "synthetic"
//! digits = 5
//! description = "LiteForex US dollar index"
//! history_m1_start = "2019-01-02"
//! ```
//!
//! Key behaviors:
//! - Names are trimmed and upper-cased; two entries that collapse to the same
//!   name are rejected, as are names longer than an MT4 symbol (12 chars).
//! - Digits are limited to 0..=8.
//! - `history_m1_start` and `history_m1_end` are `YYYY-MM-DD` dates, stored
//!   as 00:00 FXT; the end may not precede the start.
//!
//! [`CatalogRegistry`] serves the normalized catalog through the
//! [`InstrumentRegistry`] seam, reading stored history from a [`RostStore`].

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    errors::CatalogError,
    fxt,
    models::{
        bar::Bar,
        instrument::{Instrument, InstrumentKind},
    },
    providers::{InstrumentRegistry, ProviderError, rost::RostStore},
};

/// Maximum length of an MT4 symbol.
pub const MAX_SYMBOL_LENGTH: usize = 12;
/// Maximum supported price digits.
pub const MAX_DIGITS: u32 = 8;

/// Configuration payload for one instrument.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InstrumentCfg {
    /// Instrument class (`forex`, `metals`, `synthetic`).
    #[serde(rename = "type")]
    pub kind: InstrumentKind,
    /// Number of fractional price digits.
    pub digits: u32,
    /// Optional human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// First day of stored M1 history (`YYYY-MM-DD`), overrides directory scanning.
    #[serde(default)]
    pub history_m1_start: Option<String>,
    /// Last day of stored M1 history (`YYYY-MM-DD`), overrides directory scanning.
    #[serde(default)]
    pub history_m1_end: Option<String>,
    /// Whether `update` without explicit symbols includes this instrument.
    #[serde(default = "default_auto_update")]
    pub auto_update: bool,
}

fn default_auto_update() -> bool {
    true
}

/// Summary of changes performed during normalization.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NormalizationReport {
    /// Number of names that changed when upper-casing/trimming.
    pub instruments_renamed: usize,
}

/// Normalize an instrument table in place.
///
/// Errors:
/// - Empty, too long, or colliding names after normalization
/// - Digits above [`MAX_DIGITS`]
/// - Unparseable `history_m1_start`/`history_m1_end`, or an end before the start
pub fn normalize_instruments(
    instruments: &mut IndexMap<String, InstrumentCfg>,
) -> Result<NormalizationReport, CatalogError> {
    let mut report = NormalizationReport::default();
    let mut rebuilt = IndexMap::with_capacity(instruments.len());

    for (raw_name, mut cfg) in std::mem::take(instruments) {
        let name = raw_name.trim().to_uppercase();
        if name.is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if name.len() > MAX_SYMBOL_LENGTH {
            return Err(CatalogError::NameTooLong {
                name,
                max: MAX_SYMBOL_LENGTH,
            });
        }
        if name != raw_name {
            report.instruments_renamed += 1;
        }
        if rebuilt.contains_key(&name) {
            return Err(CatalogError::Duplicate(name));
        }
        if cfg.digits > MAX_DIGITS {
            return Err(CatalogError::InvalidDigits {
                name,
                digits: cfg.digits,
            });
        }
        let start = normalize_date(&name, cfg.history_m1_start.take())?;
        let end = normalize_date(&name, cfg.history_m1_end.take())?;
        if let (Some((_, first)), Some((_, last))) = (&start, &end) {
            if last < first {
                return Err(CatalogError::InvertedHistoryRange { name });
            }
        }
        cfg.history_m1_start = start.map(|(raw, _)| raw);
        cfg.history_m1_end = end.map(|(raw, _)| raw);
        cfg.description = cfg
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        rebuilt.insert(name, cfg);
    }

    *instruments = rebuilt;
    Ok(report)
}

fn normalize_date(name: &str, value: Option<String>) -> Result<Option<(String, NaiveDate)>, CatalogError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let value = value.trim().to_string();
    match parse_date(&value) {
        Some(date) => Ok(Some((value, date))),
        None => Err(CatalogError::InvalidDate {
            name: name.to_string(),
            value,
        }),
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Builds the [`Instrument`] described by a normalized entry.
pub fn instrument_from_cfg(name: &str, cfg: &InstrumentCfg) -> Instrument {
    let mut instrument = Instrument::new(name, cfg.kind, cfg.digits);
    instrument.description = cfg.description.clone();
    let day = |value: &Option<String>| value.as_deref().and_then(parse_date).map(fxt::date_start);
    instrument.history_m1_start = day(&cfg.history_m1_start);
    instrument.history_m1_end = day(&cfg.history_m1_end);
    instrument
}

/// [`InstrumentRegistry`] backed by a normalized catalog and a Rosatrader tree.
#[derive(Debug, Clone)]
pub struct CatalogRegistry {
    instruments: IndexMap<String, Instrument>,
    store: RostStore,
}

impl CatalogRegistry {
    /// Builds a registry from a normalized instrument table.
    pub fn new(instruments: &IndexMap<String, InstrumentCfg>, store: RostStore) -> Self {
        let instruments = instruments
            .iter()
            .map(|(name, cfg)| (name.clone(), instrument_from_cfg(name, cfg)))
            .collect();
        Self { instruments, store }
    }

    /// The underlying bar-file store.
    pub fn store(&self) -> &RostStore {
        &self.store
    }

    /// All instruments in catalog order.
    pub fn instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }
}

impl InstrumentRegistry for CatalogRegistry {
    fn find(&self, name: &str) -> Option<Instrument> {
        self.instruments.get(&name.trim().to_uppercase()).cloned()
    }

    fn history_start_m1(&self, instrument: &Instrument) -> Result<Option<i64>, ProviderError> {
        match instrument.history_m1_start {
            Some(start) => Ok(Some(start)),
            None => self.store.first_stored_day(instrument),
        }
    }

    fn history_end_m1(&self, instrument: &Instrument) -> Result<Option<i64>, ProviderError> {
        match instrument.history_m1_end {
            Some(end) => Ok(Some(end)),
            None => self.store.last_stored_day(instrument),
        }
    }

    fn history_m1(&self, instrument: &Instrument, day: i64) -> Result<Vec<Bar>, ProviderError> {
        self.store.read_m1(instrument, day)
    }
}
