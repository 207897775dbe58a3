//! Rosatrader M1 bar files.
//!
//! Layout on disk:
//!
//! ```text
//! {root}/{kind}/{NAME}/{YYYY}/{MM}/{DD}/M1.bin       raw day file
//! {root}/{kind}/{NAME}/{YYYY}/{MM}/{DD}/M1.bin.rar   compressed day file
//! ```
//!
//! A day file is a packed array of 24-byte records, six little-endian `u32`
//! fields each: `time` (FXT seconds), `open`, `high`, `low`, `close` (prices in
//! points) and `ticks`. Unpacking `.rar` archives is left to external tooling;
//! a day that exists only in compressed form is reported as
//! [`ProviderError::Compressed`].

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use snafu::{ResultExt, ensure};
use tracing::debug;

use crate::{
    fxt::{self, SECS_PER_DAY},
    models::{
        bar::{Bar, round_price},
        instrument::Instrument,
        period::Period,
    },
    providers::{
        HistoryProvider, ProviderError,
        errors::{CompressedSnafu, CorruptSnafu, IoSnafu, UnimplementedSnafu},
    },
};

/// Size of one M1 record in bytes.
pub const RECORD_SIZE: usize = 24;
/// File name of a raw day file.
pub const RAW_FILE: &str = "M1.bin";
/// File name of a compressed day file.
pub const COMPRESSED_FILE: &str = "M1.bin.rar";

/// Root of a Rosatrader history tree.
#[derive(Debug, Clone)]
pub struct RostStore {
    root: PathBuf,
}

impl RostStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{kind}/{NAME}`
    pub fn instrument_dir(&self, instrument: &Instrument) -> PathBuf {
        self.root
            .join(instrument.kind.dir_name())
            .join(&instrument.name)
    }

    /// `{root}/{kind}/{NAME}/{YYYY}/{MM}/{DD}`
    pub fn day_dir(&self, instrument: &Instrument, day: i64) -> PathBuf {
        let dir = self.instrument_dir(instrument);
        match fxt::datetime(day) {
            Some(dt) => dir.join(dt.format("%Y/%m/%d").to_string()),
            None => dir.join(day.to_string()),
        }
    }

    /// Reads the M1 bars stored for `day`.
    ///
    /// Returns an empty vector when no day file exists.
    pub fn read_m1(&self, instrument: &Instrument, day: i64) -> Result<Vec<Bar>, ProviderError> {
        let dir = self.day_dir(instrument, day);
        let raw = dir.join(RAW_FILE);
        if raw.is_file() {
            let bytes = fs::read(&raw).context(IoSnafu { path: &raw })?;
            return decode_day(&raw, &bytes, instrument);
        }
        let compressed = dir.join(COMPRESSED_FILE);
        ensure!(!compressed.is_file(), CompressedSnafu { path: compressed });
        debug!(instrument = %instrument.name, dir = %dir.display(), "no M1 history stored");
        Ok(Vec::new())
    }

    /// Finds the first day with a stored day file by walking the
    /// `YYYY/MM/DD` directory tree in ascending order.
    pub fn first_stored_day(&self, instrument: &Instrument) -> Result<Option<i64>, ProviderError> {
        self.find_stored_day(instrument, false)
    }

    /// Finds the last day with a stored day file, walking the tree backwards.
    pub fn last_stored_day(&self, instrument: &Instrument) -> Result<Option<i64>, ProviderError> {
        self.find_stored_day(instrument, true)
    }

    fn find_stored_day(&self, instrument: &Instrument, newest: bool) -> Result<Option<i64>, ProviderError> {
        let base = self.instrument_dir(instrument);
        if !base.is_dir() {
            return Ok(None);
        }
        let walk = |dir: &Path, width: usize| -> Result<Vec<(u32, PathBuf)>, ProviderError> {
            let mut dirs = numeric_dirs(dir, width)?;
            if newest {
                dirs.reverse();
            }
            Ok(dirs)
        };
        for (year, year_dir) in walk(&base, 4)? {
            for (month, month_dir) in walk(&year_dir, 2)? {
                for (day, day_dir) in walk(&month_dir, 2)? {
                    if !(day_dir.join(RAW_FILE).is_file() || day_dir.join(COMPRESSED_FILE).is_file()) {
                        continue;
                    }
                    if let Some(date) = NaiveDate::from_ymd_opt(year as i32, month, day) {
                        return Ok(Some(fxt::date_start(date)));
                    }
                }
            }
        }
        Ok(None)
    }
}

/// Subdirectories whose names are exactly `width` ASCII digits, sorted by value.
fn numeric_dirs(dir: &Path, width: usize) -> Result<Vec<(u32, PathBuf)>, ProviderError> {
    let entries = fs::read_dir(dir).context(IoSnafu { path: dir })?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.context(IoSnafu { path: dir })?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.len() != width || !name.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if let Ok(value) = name.parse::<u32>() {
            out.push((value, path));
        }
    }
    out.sort_by_key(|(value, _)| *value);
    Ok(out)
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Decodes a day file into bars priced with the instrument's digits.
pub fn decode_day(path: &Path, bytes: &[u8], instrument: &Instrument) -> Result<Vec<Bar>, ProviderError> {
    ensure!(
        bytes.len() % RECORD_SIZE == 0,
        CorruptSnafu {
            path,
            message: format!("size {} is not a multiple of {RECORD_SIZE}", bytes.len()),
        }
    );
    let point = instrument.point();
    let price = |points: u32| round_price(f64::from(points) * point, instrument.digits);

    let mut bars = Vec::with_capacity(bytes.len() / RECORD_SIZE);
    for record in bytes.chunks_exact(RECORD_SIZE) {
        let bar = Bar {
            time: i64::from(le_u32(record, 0)),
            open: price(le_u32(record, 4)),
            high: price(le_u32(record, 8)),
            low: price(le_u32(record, 12)),
            close: price(le_u32(record, 16)),
            ticks: u64::from(le_u32(record, 20)),
        };
        if let Some(prev) = bars.last().map(|b: &Bar| b.time) {
            ensure!(
                bar.time > prev,
                CorruptSnafu {
                    path,
                    message: format!("bar time {} not after {prev}", bar.time),
                }
            );
        }
        bars.push(bar);
    }
    Ok(bars)
}

/// Encodes bars (priced with `digits`) into day-file records.
pub fn encode_day(bars: &[Bar], digits: u32) -> Vec<u8> {
    let scale = 10f64.powi(digits as i32);
    let points = |v: f64| (v * scale).round() as u32;
    let mut out = Vec::with_capacity(bars.len() * RECORD_SIZE);
    for bar in bars {
        out.extend_from_slice(&(bar.time as u32).to_le_bytes());
        out.extend_from_slice(&points(bar.open).to_le_bytes());
        out.extend_from_slice(&points(bar.high).to_le_bytes());
        out.extend_from_slice(&points(bar.low).to_le_bytes());
        out.extend_from_slice(&points(bar.close).to_le_bytes());
        out.extend_from_slice(&(bar.ticks as u32).to_le_bytes());
    }
    out
}

/// [`HistoryProvider`] over one stored instrument.
pub struct RostHistory<'s> {
    store: &'s RostStore,
    instrument: Instrument,
}

impl<'s> RostHistory<'s> {
    /// Serves `instrument` from `store`.
    pub fn new(store: &'s RostStore, instrument: Instrument) -> Self {
        Self { store, instrument }
    }
}

impl HistoryProvider for RostHistory<'_> {
    fn history(&mut self, period: Period, day: i64) -> Result<Vec<Bar>, ProviderError> {
        ensure!(
            period == Period::M1,
            UnimplementedSnafu {
                message: format!("{} history for {}", period, self.instrument.name),
            }
        );
        let day = fxt::day_start(day);
        let bars = self.store.read_m1(&self.instrument, day)?;
        // a day file must not leak into neighbouring days
        let out_of_day = bars
            .iter()
            .find(|b| b.time < day || b.time >= day + SECS_PER_DAY)
            .map(|b| b.time);
        ensure!(
            out_of_day.is_none(),
            CorruptSnafu {
                path: self.store.day_dir(&self.instrument, day).join(RAW_FILE),
                message: format!("bar time {} outside of day {}", out_of_day.unwrap_or_default(), fxt::format_day(day)),
            }
        );
        Ok(bars)
    }

    fn history_start(&mut self, period: Period) -> Result<Option<i64>, ProviderError> {
        ensure!(
            period == Period::M1,
            UnimplementedSnafu {
                message: format!("{} history for {}", period, self.instrument.name),
            }
        );
        match self.instrument.history_m1_start {
            Some(start) => Ok(Some(start)),
            None => self.store.first_stored_day(&self.instrument),
        }
    }

    fn history_end(&mut self, period: Period) -> Result<Option<i64>, ProviderError> {
        ensure!(
            period == Period::M1,
            UnimplementedSnafu {
                message: format!("{} history for {}", period, self.instrument.name),
            }
        );
        match self.instrument.history_m1_end {
            Some(end) => Ok(Some(end)),
            None => self.store.last_stored_day(&self.instrument),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::instrument::InstrumentKind;
    use tempfile::TempDir;

    fn eurusd() -> Instrument {
        Instrument::new("EURUSD", InstrumentKind::Forex, 5)
    }

    fn day(y: i32, m: u32, d: u32) -> i64 {
        fxt::date_start(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn write_day(store: &RostStore, inst: &Instrument, day: i64, bars: &[Bar]) {
        let dir = store.day_dir(inst, day);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(RAW_FILE), encode_day(bars, inst.digits)).unwrap();
    }

    #[test]
    fn day_dir_uses_kind_name_and_date() {
        let store = RostStore::new("/data/rost");
        let dir = store.day_dir(&eurusd(), day(2022, 1, 3) + 600);
        assert_eq!(dir, PathBuf::from("/data/rost/forex/EURUSD/2022/01/03"));
    }

    #[test]
    fn reads_back_written_day() {
        let tmp = TempDir::new().unwrap();
        let store = RostStore::new(tmp.path());
        let d = day(2022, 1, 3);
        let bars = vec![
            Bar::new(d, 1.13012, 1.13020, 1.13001, 1.13015, 12),
            Bar::new(d + 60, 1.13015, 1.13019, 1.13011, 1.13011, 7),
        ];
        write_day(&store, &eurusd(), d, &bars);

        let mut provider = RostHistory::new(&store, eurusd());
        assert_eq!(provider.history(Period::M1, d).unwrap(), bars);
        assert!(provider.history(Period::M1, d + SECS_PER_DAY).unwrap().is_empty());
    }

    #[test]
    fn compressed_only_day_is_reported() {
        let tmp = TempDir::new().unwrap();
        let store = RostStore::new(tmp.path());
        let d = day(2022, 1, 4);
        let dir = store.day_dir(&eurusd(), d);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(COMPRESSED_FILE), b"Rar!").unwrap();

        let err = store.read_m1(&eurusd(), d).unwrap_err();
        assert!(matches!(err, ProviderError::Compressed { .. }));
        assert_eq!(store.first_stored_day(&eurusd()).unwrap(), Some(d));
    }

    #[test]
    fn partial_record_is_corrupt() {
        let err = decode_day(Path::new("M1.bin"), &[0u8; 30], &eurusd()).unwrap_err();
        assert!(err.to_string().contains("not a multiple of 24"));
    }

    #[test]
    fn first_stored_day_walks_the_tree_in_order() {
        let tmp = TempDir::new().unwrap();
        let store = RostStore::new(tmp.path());
        let inst = eurusd();
        write_day(&store, &inst, day(2021, 11, 2), &[]);
        write_day(&store, &inst, day(2021, 3, 15), &[]);
        // empty day directories and foreign names are ignored
        fs::create_dir_all(store.day_dir(&inst, day(2020, 12, 31))).unwrap();
        fs::create_dir_all(store.instrument_dir(&inst).join("backup")).unwrap();

        assert_eq!(store.first_stored_day(&inst).unwrap(), Some(day(2021, 3, 15)));
        let other = Instrument::new("GBPUSD", InstrumentKind::Forex, 5);
        assert_eq!(store.first_stored_day(&other).unwrap(), None);
    }

    #[test]
    fn last_stored_day_walks_the_tree_backwards() {
        let tmp = TempDir::new().unwrap();
        let store = RostStore::new(tmp.path());
        let inst = eurusd();
        write_day(&store, &inst, day(2021, 3, 15), &[]);
        write_day(&store, &inst, day(2021, 11, 2), &[]);
        write_day(&store, &inst, day(2021, 11, 9), &[]);
        // a newer year without day files does not count
        fs::create_dir_all(store.day_dir(&inst, day(2022, 1, 3))).unwrap();

        assert_eq!(store.last_stored_day(&inst).unwrap(), Some(day(2021, 11, 9)));
        let mut provider = RostHistory::new(&store, inst.clone());
        assert_eq!(provider.history_end(Period::M1).unwrap(), Some(day(2021, 11, 9)));

        let mut pinned = inst;
        pinned.history_m1_end = Some(day(2021, 6, 30));
        let mut provider = RostHistory::new(&store, pinned);
        assert_eq!(provider.history_end(Period::M1).unwrap(), Some(day(2021, 6, 30)));
    }

    #[test]
    fn configured_start_wins_over_directory_scan() {
        let tmp = TempDir::new().unwrap();
        let store = RostStore::new(tmp.path());
        let mut inst = eurusd();
        write_day(&store, &inst, day(2021, 3, 15), &[]);
        inst.history_m1_start = Some(day(2021, 6, 1));
        let mut provider = RostHistory::new(&store, inst);
        assert_eq!(provider.history_start(Period::M1).unwrap(), Some(day(2021, 6, 1)));
    }

    #[test]
    fn only_minute_history_is_served() {
        let store = RostStore::new("/nonexistent");
        let mut provider = RostHistory::new(&store, eurusd());
        let err = provider.history(Period::H1, 0).unwrap_err();
        assert!(matches!(err, ProviderError::Unimplemented { .. }));
    }
}
