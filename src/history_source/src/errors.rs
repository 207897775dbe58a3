use thiserror::Error;

/// Errors raised while normalizing an instrument catalog.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// An instrument name is empty after trimming.
    #[error("instrument name cannot be empty")]
    EmptyName,

    /// An instrument name exceeds the MT4 symbol length.
    #[error("instrument name too long (max {max} characters): {name}")]
    NameTooLong {
        /// The offending name.
        name: String,
        /// Maximum accepted length.
        max: usize,
    },

    /// Two entries collapse to the same name after normalization.
    #[error("duplicate instrument after normalization: {0}")]
    Duplicate(String),

    /// Digits outside the supported range.
    #[error("invalid digits for {name}: {digits}")]
    InvalidDigits {
        /// Instrument name.
        name: String,
        /// Configured digits.
        digits: u32,
    },

    /// A date field does not parse as `YYYY-MM-DD`.
    #[error("invalid date for {name}: {value}")]
    InvalidDate {
        /// Instrument name.
        name: String,
        /// Configured value.
        value: String,
    },

    /// `history_m1_end` lies before `history_m1_start`.
    #[error("history of {name} ends before it starts")]
    InvertedHistoryRange {
        /// Instrument name.
        name: String,
    },
}
