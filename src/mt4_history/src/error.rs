//! Error taxonomy of the history subsystem.
//!
//! [`HistoryError`] is the single error type of this crate. Format problems
//! carry a closed [`FormatErrorKind`] so callers can decide between recreating
//! and aborting without matching on message text.

use std::{fmt, path::Path};

use history_source::providers::ProviderError;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = HistoryError> = std::result::Result<T, E>;

/// What is wrong with a history file's layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatErrorKind {
    /// The file is shorter than one header.
    FileSizeInsufficient,
    /// The header names a format version other than 400 or 401.
    VersionUnsupported(u32),
    /// The bar section is not a whole number of records.
    BarBoundary,
    /// A record buffer is shorter than the format's record size.
    ShortRecord,
    /// The header's digits differ from the owning set's digits.
    DigitsMismatch,
    /// The header names a period that is not an MT4 timeframe.
    PeriodUnsupported(u32),
    /// The header's symbol differs from the one in the file name.
    SymbolMismatch,
}

impl fmt::Display for FormatErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatErrorKind::FileSizeInsufficient => f.write_str("file size insufficient"),
            FormatErrorKind::VersionUnsupported(v) => write!(f, "unsupported format version {v}"),
            FormatErrorKind::BarBoundary => f.write_str("EOF not on a bar boundary"),
            FormatErrorKind::ShortRecord => f.write_str("record shorter than bar size"),
            FormatErrorKind::DigitsMismatch => f.write_str("digits mismatch"),
            FormatErrorKind::PeriodUnsupported(p) => write!(f, "unsupported period {p}"),
            FormatErrorKind::SymbolMismatch => f.write_str("symbol mismatch"),
        }
    }
}

/// Errors raised by history files, sets, the scaler and the updater.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A file is corrupt, undersized or of an unsupported version.
    #[error("{subject}: {kind}")]
    Format {
        /// Classified cause.
        kind: FormatErrorKind,
        /// File (or symbol) the error refers to.
        subject: String,
    },

    /// A caller-supplied value was rejected before anything was modified.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation was attempted on a closed file or set.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Required history is not available (yet).
    #[error("missing data: {0}")]
    MissingData(String),

    /// Two open history sets would write to the same files.
    #[error("duplicate open history set: {0}")]
    DuplicateOpenSet(String),

    /// The operation is not supported for this input.
    #[error("not implemented: {0}")]
    Unimplemented(String),

    /// A bar provider failed.
    #[error(transparent)]
    Source(#[from] ProviderError),

    /// Reading or writing a file failed.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl HistoryError {
    /// A [`HistoryError::Format`] about the file at `path`.
    pub fn format(kind: FormatErrorKind, path: &Path) -> Self {
        HistoryError::Format {
            kind,
            subject: path.display().to_string(),
        }
    }

    /// The format error kind, if this is a format error.
    pub fn format_kind(&self) -> Option<FormatErrorKind> {
        match self {
            HistoryError::Format { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
