//! One `.hst` file: a single (symbol, period) series.
//!
//! A [`HistoryFile`] owns its file handle exclusively. It is either open or
//! closed; every operation on a closed file fails with
//! [`HistoryError::InvalidState`]. Dropping the value releases the handle.
//!
//! Writes go straight to the file. [`HistoryFile::synchronize`] writes the bar
//! data first and only then advances the header's sync marks, so a crash can
//! never leave a sync mark pointing past the data actually written.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use history_source::models::{
    bar::{Bar, is_strictly_increasing},
    period::Period,
};
use tracing::{debug, trace};

use crate::{
    codec::{
        BarFormat, HEADER_SIZE, HistoryHeader, MAX_SYMBOL_LENGTH, decode_bar, decode_header,
        encode_bars, encode_header,
    },
    error::{FormatErrorKind, HistoryError, Result},
    locator::{FileBarTimes, find_first_at_or_after},
};

/// `{SYMBOL}{minutes}.hst`
pub fn file_name(symbol: &str, period: Period) -> String {
    format!("{symbol}{}.hst", period.minutes())
}

/// Checks that `symbol` fits an MT4 header.
pub fn validate_symbol(symbol: &str) -> Result<()> {
    if symbol.is_empty() || symbol.len() > MAX_SYMBOL_LENGTH {
        return Err(HistoryError::InvalidArgument(format!(
            "symbol must have 1 to {MAX_SYMBOL_LENGTH} characters: {symbol:?}"
        )));
    }
    if symbol.contains(['/', '\\', '\0']) {
        return Err(HistoryError::InvalidArgument(format!("illegal symbol: {symbol:?}")));
    }
    Ok(())
}

/// An open (or closed) history file.
#[derive(Debug)]
pub struct HistoryFile {
    path: PathBuf,
    header: HistoryHeader,
    period: Period,
    file: Option<File>,
    bar_count: usize,
    last_time: Option<i64>,
}

impl HistoryFile {
    /// Creates (or truncates) `{dir}/{SYMBOL}{minutes}.hst` with an empty series.
    pub fn create(dir: &Path, symbol: &str, period: Period, digits: u32, format: BarFormat) -> Result<Self> {
        validate_symbol(symbol)?;
        let path = dir.join(file_name(symbol, period));
        let header = HistoryHeader::new(format, symbol, period, digits);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.write_all(&encode_header(&header))?;
        debug!(path = %path.display(), "created history file");

        Ok(Self {
            path,
            header,
            period,
            file: Some(file),
            bar_count: 0,
            last_time: None,
        })
    }

    /// Opens an existing file and validates its header and size.
    ///
    /// Errors:
    /// - [`FormatErrorKind::FileSizeInsufficient`] if shorter than a header
    /// - [`FormatErrorKind::VersionUnsupported`] for unknown versions
    /// - [`FormatErrorKind::PeriodUnsupported`] for non-MT4 periods
    /// - [`FormatErrorKind::BarBoundary`] if the bar section is truncated
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len() as usize;
        if size < HEADER_SIZE {
            return Err(HistoryError::format(FormatErrorKind::FileSizeInsufficient, path));
        }
        let mut raw = [0u8; HEADER_SIZE];
        file.read_exact(&mut raw)?;
        let header = decode_header(&raw).map_err(|kind| HistoryError::format(kind, path))?;
        let period = header
            .timeframe()
            .ok_or_else(|| HistoryError::format(FormatErrorKind::PeriodUnsupported(header.period), path))?;

        let bar_size = header.format.bar_size();
        if (size - HEADER_SIZE) % bar_size != 0 {
            return Err(HistoryError::format(FormatErrorKind::BarBoundary, path));
        }

        let mut this = Self {
            path: path.to_path_buf(),
            header,
            period,
            file: Some(file),
            bar_count: (size - HEADER_SIZE) / bar_size,
            last_time: None,
        };
        if this.bar_count > 0 {
            this.last_time = Some(this.bar(this.bar_count - 1)?.time);
        }
        debug!(path = %path.display(), bars = this.bar_count, "opened history file");
        Ok(this)
    }

    /// Location on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current header.
    pub fn header(&self) -> &HistoryHeader {
        &self.header
    }

    /// Symbol stored in the header.
    pub fn symbol(&self) -> &str {
        &self.header.symbol
    }

    /// Timeframe of the series.
    pub fn period(&self) -> Period {
        self.period
    }

    /// Price digits.
    pub fn digits(&self) -> u32 {
        self.header.digits
    }

    /// Record layout.
    pub fn format(&self) -> BarFormat {
        self.header.format
    }

    /// Number of stored bars.
    pub fn bar_count(&self) -> usize {
        self.bar_count
    }

    /// Open time of the newest bar.
    pub fn last_time(&self) -> Option<i64> {
        self.last_time
    }

    /// Time of the newest synchronized bar (0 if never synchronized).
    pub fn sync_mark(&self) -> i64 {
        i64::from(self.header.sync_mark)
    }

    /// Previous sync mark.
    pub fn prev_sync_mark(&self) -> i64 {
        i64::from(self.header.prev_sync_mark)
    }

    /// Whether the file is still open.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn handle(&mut self) -> Result<&mut File> {
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(HistoryError::InvalidState(format!(
                "history file {} is closed",
                self.path.display()
            ))),
        }
    }

    fn bar_offset(&self, index: usize) -> u64 {
        (HEADER_SIZE + index * self.header.format.bar_size()) as u64
    }

    /// Reads the bar at `index`.
    pub fn bar(&mut self, index: usize) -> Result<Bar> {
        if index >= self.bar_count {
            return Err(HistoryError::InvalidArgument(format!(
                "bar index {index} out of range ({} bars in {})",
                self.bar_count,
                self.path.display()
            )));
        }
        let format = self.header.format;
        let offset = self.bar_offset(index);
        let file = self.handle()?;
        let mut buf = vec![0u8; format.bar_size()];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        decode_bar(format, &buf).map_err(|kind| HistoryError::format(kind, &self.path))
    }

    /// Reads `count` bars starting at `start`.
    pub fn read_range(&mut self, start: usize, count: usize) -> Result<Vec<Bar>> {
        let end = start.saturating_add(count).min(self.bar_count);
        if start >= end {
            self.handle()?;
            return Ok(Vec::new());
        }
        let format = self.header.format;
        let offset = self.bar_offset(start);
        let file = self.handle()?;
        let mut buf = vec![0u8; (end - start) * format.bar_size()];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        buf.chunks_exact(format.bar_size())
            .map(|rec| decode_bar(format, rec).map_err(|kind| HistoryError::format(kind, &self.path)))
            .collect()
    }

    /// Reads every stored bar.
    pub fn read_bars(&mut self) -> Result<Vec<Bar>> {
        self.read_range(0, self.bar_count)
    }

    /// Appends bars after the newest stored bar.
    ///
    /// Errors:
    /// - [`HistoryError::InvalidArgument`] unless `bars` is strictly increasing,
    ///   aligned to the file's period, representable in its record format and
    ///   starts after [`HistoryFile::last_time`]; nothing is written then
    pub fn append_bars(&mut self, bars: &[Bar]) -> Result<usize> {
        self.handle()?;
        let Some(first) = bars.first() else {
            return Ok(0);
        };
        self.check_incoming(bars)?;
        if let Some(last) = self.last_time {
            if first.time <= last {
                return Err(HistoryError::InvalidArgument(format!(
                    "cannot append bar at {} to {}: last stored bar is at {last}",
                    first.time,
                    self.path.display()
                )));
            }
        }
        let offset = self.bar_offset(self.bar_count);
        let data = encode_bars(self.header.format, bars);
        let file = self.handle()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&data)?;

        self.bar_count += bars.len();
        self.last_time = bars.last().map(|b| b.time);
        Ok(bars.len())
    }

    /// Merges one day of bars into the stored series.
    ///
    /// Stored bars older than the first incoming bar stay untouched. From the
    /// first stored bar with `time >= bars[0].time` on, the stored tail is
    /// replaced by the incoming bars; stored bars newer than the last incoming
    /// bar are kept after them. Afterwards `syncMark` is the last incoming time
    /// and `prevSyncMark` the former `syncMark`. Repeating a synchronize with
    /// the same bars leaves the file byte-identical.
    ///
    /// Returns the number of incoming bars written.
    ///
    /// Errors:
    /// - [`HistoryError::InvalidArgument`] for the same input checks as
    ///   [`HistoryFile::append_bars`], or if the last bar time does not fit
    ///   the header's 32-bit sync mark; nothing is written then
    pub fn synchronize(&mut self, bars: &[Bar]) -> Result<usize> {
        self.handle()?;
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Ok(0);
        };
        self.check_incoming(bars)?;
        let mark = i32::try_from(last.time).map_err(|_| {
            HistoryError::InvalidArgument(format!("sync mark out of range: {}", last.time))
        })?;
        let (first_time, last_time) = (first.time, last.time);
        let format = self.header.format;

        let (insert_at, reads) = {
            let count = self.bar_count;
            let file = self.handle()?;
            let mut times = FileBarTimes::new(file, format, count);
            (find_first_at_or_after(&mut times, first_time)?, times.reads())
        };
        trace!(path = %self.path.display(), insert_at, reads, "located merge point");
        let kept: Vec<Bar> = self
            .read_range(insert_at, self.bar_count - insert_at)?
            .into_iter()
            .filter(|b| b.time > last_time)
            .collect();

        let mut data = encode_bars(format, bars);
        data.extend_from_slice(&encode_bars(format, &kept));
        let new_count = insert_at + bars.len() + kept.len();
        let offset = self.bar_offset(insert_at);
        let end = self.bar_offset(new_count);
        let old_count = self.bar_count;

        let file = self.handle()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&data)?;
        if new_count < old_count {
            file.set_len(end)?;
        }
        file.sync_data()?;
        self.bar_count = new_count;
        self.last_time = kept.last().or(Some(last)).map(|b| b.time);

        // checkpoint only after the data is on disk
        if self.header.sync_mark != mark {
            self.header.prev_sync_mark = self.header.sync_mark;
            self.header.sync_mark = mark;
            let raw = encode_header(&self.header);
            let file = self.handle()?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&raw)?;
            file.sync_data()?;
        }
        debug!(
            path = %self.path.display(),
            written = bars.len(),
            kept = kept.len(),
            bars = self.bar_count,
            "synchronized"
        );
        Ok(bars.len())
    }

    fn check_incoming(&self, bars: &[Bar]) -> Result<()> {
        if !is_strictly_increasing(bars) {
            return Err(HistoryError::InvalidArgument("bars not in ascending time order".into()));
        }
        if let Some(bar) = bars.iter().find(|b| !self.period.is_aligned(b.time)) {
            return Err(HistoryError::InvalidArgument(format!(
                "bar at {} is not aligned to {}",
                bar.time, self.period
            )));
        }
        if self.header.format == BarFormat::V400 {
            if let Some(bar) = bars.iter().find(|b| i32::try_from(b.time).is_err()) {
                return Err(HistoryError::InvalidArgument(format!(
                    "bar time {} does not fit a format 400 record",
                    bar.time
                )));
            }
        }
        Ok(())
    }

    /// Flushes and releases the file handle.
    ///
    /// Returns `false` if the file was already closed.
    pub fn close(&mut self) -> Result<bool> {
        match self.file.take() {
            Some(mut file) => {
                file.flush()?;
                file.sync_all()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn m1(t: i64, price: f64) -> Bar {
        Bar::new(t, price, price + 0.0002, price - 0.0001, price + 0.0001, 3)
    }

    #[test]
    fn new_file_is_just_a_header() {
        let dir = TempDir::new().unwrap();
        let file = HistoryFile::create(dir.path(), "EURUSD", Period::M15, 5, BarFormat::V400).unwrap();
        assert_eq!(file.path().file_name().unwrap(), "EURUSD15.hst");
        assert_eq!(std::fs::metadata(file.path()).unwrap().len(), HEADER_SIZE as u64);
        assert_eq!(file.bar_count(), 0);
        assert_eq!(file.last_time(), None);
    }

    #[test]
    fn symbols_are_validated() {
        let dir = TempDir::new().unwrap();
        for bad in ["", "ABCDEFGHIJKLM", "EUR/USD"] {
            let err = HistoryFile::create(dir.path(), bad, Period::M1, 5, BarFormat::V400).unwrap_err();
            assert!(matches!(err, HistoryError::InvalidArgument(_)), "{bad}");
        }
    }

    #[test]
    fn append_requires_newer_bars() {
        let dir = TempDir::new().unwrap();
        let mut file = HistoryFile::create(dir.path(), "EURUSD", Period::M1, 5, BarFormat::V401).unwrap();
        file.append_bars(&[m1(60, 1.1), m1(120, 1.2)]).unwrap();

        let err = file.append_bars(&[m1(120, 1.3)]).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidArgument(_)));
        let err = file.append_bars(&[m1(300, 1.3), m1(240, 1.3)]).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidArgument(_)));

        file.append_bars(&[m1(180, 1.3)]).unwrap();
        assert_eq!(file.read_bars().unwrap(), vec![m1(60, 1.1), m1(120, 1.2), m1(180, 1.3)]);
    }

    #[test]
    fn reopen_reads_header_and_last_bar() {
        let dir = TempDir::new().unwrap();
        let path = {
            let mut file = HistoryFile::create(dir.path(), "GBPUSD", Period::M1, 5, BarFormat::V400).unwrap();
            file.synchronize(&[m1(60, 1.3), m1(120, 1.31)]).unwrap();
            file.close().unwrap();
            file.path().to_path_buf()
        };
        let file = HistoryFile::open(&path).unwrap();
        assert_eq!(file.symbol(), "GBPUSD");
        assert_eq!(file.period(), Period::M1);
        assert_eq!(file.bar_count(), 2);
        assert_eq!(file.last_time(), Some(120));
        assert_eq!(file.sync_mark(), 120);
    }

    #[test]
    fn open_rejects_undersized_and_ragged_files() {
        let dir = TempDir::new().unwrap();
        let short = dir.path().join("EURUSD1.hst");
        std::fs::write(&short, [0u8; 100]).unwrap();
        let err = HistoryFile::open(&short).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::FileSizeInsufficient));

        let mut file = HistoryFile::create(dir.path(), "EURUSD", Period::M5, 5, BarFormat::V400).unwrap();
        file.append_bars(&[m1(300, 1.1)]).unwrap();
        file.close().unwrap();
        let path = dir.path().join("EURUSD5.hst");
        let mut raw = std::fs::read(&path).unwrap();
        raw.truncate(raw.len() - 1);
        std::fs::write(&path, raw).unwrap();
        let err = HistoryFile::open(&path).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::BarBoundary));
    }

    #[test]
    fn synchronize_overwrites_tail_and_keeps_head() {
        let dir = TempDir::new().unwrap();
        let mut file = HistoryFile::create(dir.path(), "EURUSD", Period::M1, 5, BarFormat::V400).unwrap();
        file.synchronize(&[m1(60, 1.0), m1(120, 1.1), m1(180, 1.2)]).unwrap();
        file.synchronize(&[m1(120, 2.1), m1(180, 2.2), m1(240, 2.3)]).unwrap();

        assert_eq!(
            file.read_bars().unwrap(),
            vec![m1(60, 1.0), m1(120, 2.1), m1(180, 2.2), m1(240, 2.3)]
        );
        assert_eq!(file.sync_mark(), 240);
        assert_eq!(file.prev_sync_mark(), 180);
    }

    #[test]
    fn synchronize_keeps_newer_stored_bars() {
        let dir = TempDir::new().unwrap();
        let mut file = HistoryFile::create(dir.path(), "EURUSD", Period::M1, 5, BarFormat::V401).unwrap();
        file.append_bars(&[m1(60, 1.0), m1(180, 1.2), m1(240, 1.3), m1(300, 1.4)]).unwrap();
        file.synchronize(&[m1(120, 9.0), m1(180, 9.1)]).unwrap();

        assert_eq!(
            file.read_bars().unwrap(),
            vec![m1(60, 1.0), m1(120, 9.0), m1(180, 9.1), m1(240, 1.3), m1(300, 1.4)]
        );
        assert_eq!(file.last_time(), Some(300));
    }

    #[test]
    fn synchronize_shrinks_when_incoming_replaces_more() {
        let dir = TempDir::new().unwrap();
        let mut file = HistoryFile::create(dir.path(), "EURUSD", Period::M1, 5, BarFormat::V400).unwrap();
        file.append_bars(&[m1(60, 1.0), m1(120, 1.1), m1(180, 1.15), m1(240, 1.2)]).unwrap();
        file.synchronize(&[m1(120, 3.0), m1(240, 3.2)]).unwrap();

        assert_eq!(file.read_bars().unwrap(), vec![m1(60, 1.0), m1(120, 3.0), m1(240, 3.2)]);
        let size = std::fs::metadata(file.path()).unwrap().len();
        assert_eq!(size, (HEADER_SIZE + 3 * BarFormat::V400.bar_size()) as u64);
    }

    #[test]
    fn misaligned_bars_are_rejected_before_writing() {
        let dir = TempDir::new().unwrap();
        let mut file = HistoryFile::create(dir.path(), "EURUSD", Period::M5, 5, BarFormat::V401).unwrap();
        file.append_bars(&[m1(300, 1.0)]).unwrap();
        let before = std::fs::read(file.path()).unwrap();

        let err = file.append_bars(&[m1(600, 1.1), m1(660, 1.2)]).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidArgument(_)));
        let err = file.synchronize(&[m1(300, 2.0), m1(450, 2.1)]).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidArgument(_)));

        assert_eq!(std::fs::read(file.path()).unwrap(), before);
        assert_eq!(file.bar_count(), 1);
        assert_eq!(file.sync_mark(), 0);
    }

    #[test]
    fn times_beyond_32_bits_are_rejected_before_writing() {
        let dir = TempDir::new().unwrap();
        // first minute boundary past i32::MAX (2038-01-19 03:15)
        let late = (i64::from(i32::MAX) / 60 + 1) * 60;

        let mut old = HistoryFile::create(dir.path(), "EURUSD", Period::M1, 5, BarFormat::V400).unwrap();
        let before = std::fs::read(old.path()).unwrap();
        let err = old.append_bars(&[m1(late, 1.0)]).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidArgument(_)));
        let err = old.synchronize(&[m1(late - 60, 1.0), m1(late, 1.1)]).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidArgument(_)));
        assert_eq!(std::fs::read(old.path()).unwrap(), before);

        // format 401 records hold 64-bit times, the header sync mark does not
        let mut new = HistoryFile::create(dir.path(), "GBPUSD", Period::M1, 5, BarFormat::V401).unwrap();
        new.append_bars(&[m1(late, 1.0)]).unwrap();
        assert_eq!(new.read_bars().unwrap(), vec![m1(late, 1.0)]);
        let err = new.synchronize(&[m1(late + 60, 1.1)]).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidArgument(_)));
        assert_eq!(new.bar_count(), 1);
        assert_eq!(new.sync_mark(), 0);
    }

    #[test]
    fn synchronize_twice_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let mut file = HistoryFile::create(dir.path(), "EURUSD", Period::M1, 5, BarFormat::V400).unwrap();
        let day = [m1(60, 1.0), m1(120, 1.1), m1(180, 1.2)];
        file.synchronize(&day).unwrap();
        let once = std::fs::read(file.path()).unwrap();
        file.synchronize(&day).unwrap();
        let twice = std::fs::read(file.path()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn closed_file_rejects_everything() {
        let dir = TempDir::new().unwrap();
        let mut file = HistoryFile::create(dir.path(), "EURUSD", Period::M1, 5, BarFormat::V400).unwrap();
        assert!(file.close().unwrap());
        assert!(!file.close().unwrap());
        assert!(!file.is_open());
        for err in [
            file.append_bars(&[m1(60, 1.0)]).unwrap_err(),
            file.synchronize(&[m1(60, 1.0)]).unwrap_err(),
            file.read_bars().unwrap_err(),
        ] {
            assert!(matches!(err, HistoryError::InvalidState(_)));
        }
    }
}
