//! All timeframe files of one symbol in one directory.
//!
//! A [`HistorySet`] holds up to nine [`HistoryFile`]s, one per [`Period`].
//! Files of an existing set are opened lazily on first access; files that do
//! not exist yet are created on first write. Only the M1 file receives data:
//! the higher timeframes are kept as empty placeholders and are not aggregated
//! from M1.
//!
//! Sets are created and looked up through
//! [`SetRegistry`](crate::registry::SetRegistry), which guarantees a single
//! open set per (symbol, directory).

use std::path::{Path, PathBuf};

use history_source::models::{bar::Bar, period::Period};
use tracing::{debug, warn};

use crate::{
    codec::BarFormat,
    error::{FormatErrorKind, HistoryError, Result},
    file::{HistoryFile, file_name},
};

/// The timeframe files of one symbol.
#[derive(Debug)]
pub struct HistorySet {
    symbol: String,
    digits: u32,
    format: BarFormat,
    directory: PathBuf,
    files: [Option<HistoryFile>; 9],
    closed: bool,
}

impl HistorySet {
    /// Creates (truncating) all nine files in `directory`.
    pub(crate) fn create(symbol: &str, digits: u32, format: BarFormat, directory: &Path) -> Result<Self> {
        let mut set = Self::empty(symbol, digits, format, directory);
        for period in Period::ALL {
            set.files[period.index()] = Some(HistoryFile::create(directory, symbol, period, digits, format)?);
        }
        debug!(symbol, dir = %directory.display(), "created history set");
        Ok(set)
    }

    /// Builds a set around an already opened file of the set.
    ///
    /// Digits and format are taken from that file's header; `symbol` is the
    /// name the files are looked up by.
    pub(crate) fn from_file(file: HistoryFile, symbol: &str, directory: &Path) -> Self {
        let mut set = Self::empty(symbol, file.digits(), file.format(), directory);
        let index = file.period().index();
        set.files[index] = Some(file);
        set
    }

    fn empty(symbol: &str, digits: u32, format: BarFormat, directory: &Path) -> Self {
        Self {
            symbol: symbol.to_string(),
            digits,
            format,
            directory: directory.to_path_buf(),
            files: Default::default(),
            closed: false,
        }
    }

    /// Symbol of the set.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Price digits shared by all files.
    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// Record layout used for new files.
    pub fn format(&self) -> BarFormat {
        self.format
    }

    /// Directory holding the files.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Whether [`HistorySet::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(HistoryError::InvalidState(format!(
                "history set {} in {} is closed",
                self.symbol,
                self.directory.display()
            )));
        }
        Ok(())
    }

    /// Opens the file of `period` if it exists on disk and is not loaded yet.
    fn load(&mut self, period: Period) -> Result<()> {
        let slot = period.index();
        if self.files[slot].is_some() {
            return Ok(());
        }
        let path = self.directory.join(file_name(&self.symbol, period));
        if !path.is_file() {
            return Ok(());
        }
        match HistoryFile::open(&path) {
            Ok(file) => {
                if !file.symbol().eq_ignore_ascii_case(&self.symbol) {
                    return Err(HistoryError::format(FormatErrorKind::SymbolMismatch, &path));
                }
                if file.digits() != self.digits {
                    return Err(HistoryError::format(FormatErrorKind::DigitsMismatch, &path));
                }
                self.files[slot] = Some(file);
                Ok(())
            }
            Err(err) if err.format_kind() == Some(FormatErrorKind::FileSizeInsufficient) => {
                warn!(path = %path.display(), "ignoring undersized history file");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// The file of `period`, opened from disk if needed; `None` if it does not exist.
    pub fn file(&mut self, period: Period) -> Result<Option<&mut HistoryFile>> {
        self.ensure_open()?;
        self.load(period)?;
        Ok(self.files[period.index()].as_mut())
    }

    /// The file of `period`, created if it does not exist.
    pub fn file_or_create(&mut self, period: Period) -> Result<&mut HistoryFile> {
        self.ensure_open()?;
        self.load(period)?;
        let slot = period.index();
        if self.files[slot].is_none() {
            let file = HistoryFile::create(&self.directory, &self.symbol, period, self.digits, self.format)?;
            self.files[slot] = Some(file);
        }
        self.files[slot]
            .as_mut()
            .ok_or_else(|| HistoryError::InvalidState(format!("no {period} file for {}", self.symbol)))
    }

    /// Appends M1 bars. Files of all periods are created if missing.
    pub fn append_bars(&mut self, bars: &[Bar]) -> Result<usize> {
        let mut written = 0;
        for period in Period::ALL {
            let file = self.file_or_create(period)?;
            if period == Period::M1 {
                written = file.append_bars(bars)?;
            }
        }
        Ok(written)
    }

    /// Synchronizes one day of M1 bars. Files of all periods are created if missing.
    pub fn synchronize(&mut self, bars: &[Bar]) -> Result<usize> {
        let mut written = 0;
        for period in Period::ALL {
            let file = self.file_or_create(period)?;
            if period == Period::M1 {
                written = file.synchronize(bars)?;
            }
        }
        Ok(written)
    }

    /// Oldest sync mark of the set's files, looking no further than M1.
    ///
    /// Returns `None` if the set has no M1 file; `Some(0)` means never synchronized.
    pub fn last_sync_time(&mut self) -> Result<Option<i64>> {
        let mut oldest: Option<i64> = None;
        for period in Period::ALL {
            if let Some(file) = self.file(period)? {
                let mark = file.sync_mark();
                oldest = Some(oldest.map_or(mark, |o| o.min(mark)));
            }
            if period == Period::M1 {
                break;
            }
        }
        Ok(oldest)
    }

    /// Closes every file.
    ///
    /// Returns `false` if the set was already closed. All files are closed
    /// even if one fails; the first failure is returned.
    pub fn close(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        self.closed = true;
        let mut first_err = None;
        for file in self.files.iter_mut().flatten() {
            if let Err(err) = file.close() {
                first_err.get_or_insert(err);
            }
        }
        self.files = Default::default();
        match first_err {
            Some(err) => Err(err),
            None => Ok(true),
        }
    }
}
