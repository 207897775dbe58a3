//! Registry of open history sets.
//!
//! The registry is an explicit value owned by the caller (typically the update
//! loop). It keys sets by upper-cased symbol and canonical directory and makes
//! sure at most one open set exists per key:
//! - [`SetRegistry::create`] closes and replaces any set registered for the key.
//! - [`SetRegistry::get`] returns the registered set or opens one from disk.
//! - [`SetRegistry::close`] / [`SetRegistry::close_all`] close and unregister.
//!
//! The registry is not synchronized; share it across threads only behind a lock.

use std::path::{Path, PathBuf};

use history_source::models::period::Period;
use tracing::{debug, warn};

use crate::{
    codec::BarFormat,
    error::{FormatErrorKind, HistoryError, Result},
    file::{HistoryFile, file_name, validate_symbol},
    set::HistorySet,
};

/// How [`SetRegistry::get_or_create`] obtained its set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOrigin {
    /// A new set was created; all files are empty.
    NewFromScratch,
    /// An existing set was found in the registry or on disk.
    OpenExisting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SetKey {
    symbol: String,
    directory: PathBuf,
}

impl SetKey {
    fn of(set: &HistorySet) -> Self {
        Self {
            symbol: set.symbol().to_uppercase(),
            directory: set.directory().to_path_buf(),
        }
    }
}

/// Owner of all open [`HistorySet`]s of a process.
#[derive(Debug, Default)]
pub struct SetRegistry {
    sets: Vec<HistorySet>,
}

impl SetRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered open sets.
    pub fn len(&self) -> usize {
        self.sets.iter().filter(|s| !s.is_closed()).count()
    }

    /// Whether no open set is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(symbol: &str, directory: &Path) -> Result<SetKey> {
        Ok(SetKey {
            symbol: symbol.to_uppercase(),
            directory: directory.canonicalize()?,
        })
    }

    fn position(&self, key: &SetKey) -> Option<usize> {
        self.sets
            .iter()
            .position(|s| !s.is_closed() && SetKey::of(s) == *key)
    }

    fn register(&mut self, set: HistorySet) -> Result<usize> {
        self.sets.retain(|s| !s.is_closed());
        let key = SetKey::of(&set);
        if self.position(&key).is_some() {
            return Err(HistoryError::DuplicateOpenSet(format!(
                "{} in {}",
                key.symbol,
                key.directory.display()
            )));
        }
        self.sets.push(set);
        Ok(self.sets.len() - 1)
    }

    /// Creates a fresh set, truncating all nine files.
    ///
    /// A set already registered for the same key is closed first.
    pub fn create(
        &mut self,
        symbol: &str,
        digits: u32,
        format: BarFormat,
        directory: &Path,
    ) -> Result<&mut HistorySet> {
        validate_symbol(symbol)?;
        std::fs::create_dir_all(directory)?;
        let key = Self::key(symbol, directory)?;
        if let Some(i) = self.position(&key) {
            let mut previous = self.sets.remove(i);
            previous.close()?;
            debug!(symbol, dir = %key.directory.display(), "closed superseded history set");
        }
        let set = HistorySet::create(symbol, digits, format, &key.directory)?;
        let i = self.register(set)?;
        Ok(&mut self.sets[i])
    }

    /// Returns the open set for (symbol, directory), opening it from disk if needed.
    ///
    /// Files are probed in period order; the first readable one defines the
    /// set. Corrupt files and files whose header names another symbol are
    /// skipped with a warning. Returns `None` if the directory holds no
    /// usable file of the symbol.
    pub fn get(&mut self, symbol: &str, directory: &Path) -> Result<Option<&mut HistorySet>> {
        if !directory.is_dir() {
            return Ok(None);
        }
        let key = Self::key(symbol, directory)?;
        if let Some(i) = self.position(&key) {
            return Ok(Some(&mut self.sets[i]));
        }
        for period in Period::ALL {
            let path = key.directory.join(file_name(symbol, period));
            if !path.is_file() {
                continue;
            }
            match HistoryFile::open(&path) {
                Ok(file) if !file.symbol().eq_ignore_ascii_case(symbol) => {
                    warn!(
                        path = %path.display(),
                        stored = file.symbol(),
                        "skipping history file of another symbol"
                    );
                }
                Ok(file) => {
                    debug!(path = %path.display(), "opened history set from disk");
                    let i = self.register(HistorySet::from_file(file, symbol, &key.directory))?;
                    return Ok(Some(&mut self.sets[i]));
                }
                Err(err @ HistoryError::Format { .. }) => {
                    warn!(path = %path.display(), error = %err, "skipping unusable history file");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    /// [`SetRegistry::get`], falling back to [`SetRegistry::create`].
    ///
    /// Errors:
    /// - [`FormatErrorKind::DigitsMismatch`] if an existing set stores other digits
    pub fn get_or_create(
        &mut self,
        symbol: &str,
        digits: u32,
        format: BarFormat,
        directory: &Path,
    ) -> Result<(SetOrigin, &mut HistorySet)> {
        let existing = match self.get(symbol, directory)? {
            Some(set) => Some((set.digits(), set.directory().to_path_buf())),
            None => None,
        };
        match existing {
            Some((found, dir)) if found != digits => Err(HistoryError::Format {
                kind: FormatErrorKind::DigitsMismatch,
                subject: format!("{symbol} in {} (stored {found}, expected {digits})", dir.display()),
            }),
            Some(_) => {
                let key = Self::key(symbol, directory)?;
                let i = self
                    .position(&key)
                    .ok_or_else(|| HistoryError::InvalidState(format!("{symbol} vanished from registry")))?;
                Ok((SetOrigin::OpenExisting, &mut self.sets[i]))
            }
            None => Ok((SetOrigin::NewFromScratch, self.create(symbol, digits, format, directory)?)),
        }
    }

    /// Closes and unregisters the set for (symbol, directory).
    ///
    /// Returns whether a set was closed.
    pub fn close(&mut self, symbol: &str, directory: &Path) -> Result<bool> {
        if !directory.is_dir() {
            return Ok(false);
        }
        let key = Self::key(symbol, directory)?;
        match self.position(&key) {
            Some(i) => self.sets.remove(i).close(),
            None => Ok(false),
        }
    }

    /// Closes and unregisters every set. Returns how many were open.
    pub fn close_all(&mut self) -> Result<usize> {
        let mut closed = 0;
        let mut first_err = None;
        for mut set in self.sets.drain(..) {
            match set.close() {
                Ok(true) => closed += 1,
                Ok(false) => {}
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(closed),
        }
    }
}
