//! MT4 `.hst` binary layout.
//!
//! A history file is a 148-byte header followed by fixed-size bar records.
//! Everything is little-endian; prices are IEEE-754 doubles.
//!
//! Header (both versions):
//!
//! | offset | size | field          |
//! |-------:|-----:|----------------|
//! |      0 |    4 | version (u32)  |
//! |      4 |   64 | description    |
//! |     68 |   12 | symbol         |
//! |     80 |    4 | period (u32)   |
//! |     84 |    4 | digits (u32)   |
//! |     88 |    4 | syncMark (i32) |
//! |     92 |    4 | prevSyncMark   |
//! |     96 |    4 | periodFlag     |
//! |    100 |    4 | timezone       |
//! |    104 |   44 | reserved       |
//!
//! Format 400 records (44 bytes): `time i32, open, low, high, close, volume` as
//! doubles. Note the on-disk order is open/low/high/close.
//!
//! Format 401 records (60 bytes): `time i64, open, high, low, close` as doubles,
//! `tick_volume u64, spread i32, real_volume u64`.
//!
//! Decoding a buffer of the right length never fails on its content, except
//! for an unknown header version.

use history_source::models::{bar::Bar, period::Period};

use crate::error::FormatErrorKind;

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 148;
/// Description written into new headers.
pub const DEFAULT_DESCRIPTION: &str = "mt4.rosasurfer.com";
/// Maximum symbol length in bytes.
pub const MAX_SYMBOL_LENGTH: usize = 12;

const DESCRIPTION_LEN: usize = 64;
const RESERVED_LEN: usize = 44;

/// On-disk record layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarFormat {
    /// Legacy 44-byte records.
    V400,
    /// 60-byte records with 64-bit time.
    V401,
}

impl BarFormat {
    /// Version number stored in the header.
    pub const fn version(self) -> u32 {
        match self {
            BarFormat::V400 => 400,
            BarFormat::V401 => 401,
        }
    }

    /// Format for a header version number.
    pub const fn from_version(version: u32) -> Option<Self> {
        match version {
            400 => Some(BarFormat::V400),
            401 => Some(BarFormat::V401),
            _ => None,
        }
    }

    /// Size of one bar record in bytes.
    pub const fn bar_size(self) -> usize {
        match self {
            BarFormat::V400 => 44,
            BarFormat::V401 => 60,
        }
    }

    /// Byte offsets of `open`, `high`, `low` and `close` within a record.
    pub const fn price_offsets(self) -> [usize; 4] {
        match self {
            BarFormat::V400 => [4, 20, 12, 28],
            BarFormat::V401 => [8, 16, 24, 32],
        }
    }
}

impl TryFrom<u32> for BarFormat {
    type Error = FormatErrorKind;

    fn try_from(version: u32) -> Result<Self, Self::Error> {
        BarFormat::from_version(version).ok_or(FormatErrorKind::VersionUnsupported(version))
    }
}

/// Decoded file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryHeader {
    /// Record layout.
    pub format: BarFormat,
    /// Free text, at most 64 bytes.
    pub description: String,
    /// Symbol, at most 12 bytes.
    pub symbol: String,
    /// Timeframe in minutes. Not validated at this layer.
    pub period: u32,
    /// Price digits.
    pub digits: u32,
    /// Time of the newest synchronized bar.
    pub sync_mark: i32,
    /// Previous value of `sync_mark`.
    pub prev_sync_mark: i32,
    /// Opaque terminal flag.
    pub period_flag: u32,
    /// Opaque timezone identifier.
    pub timezone_id: u32,
    /// Unused trailing bytes, preserved as read.
    pub reserved: [u8; RESERVED_LEN],
}

impl HistoryHeader {
    /// Header for a new, empty file.
    pub fn new(format: BarFormat, symbol: &str, period: Period, digits: u32) -> Self {
        Self {
            format,
            description: DEFAULT_DESCRIPTION.to_string(),
            symbol: symbol.to_string(),
            period: period.minutes(),
            digits,
            sync_mark: 0,
            prev_sync_mark: 0,
            period_flag: 0,
            timezone_id: 0,
            reserved: [0; RESERVED_LEN],
        }
    }

    /// The header's period, if it is an MT4 timeframe.
    pub fn timeframe(&self) -> Option<Period> {
        Period::from_minutes(self.period)
    }
}

// ----- header -----

/// Encodes a header into its 148-byte block.
pub fn encode_header(h: &HistoryHeader) -> [u8; HEADER_SIZE] {
    let mut out = [0u8; HEADER_SIZE];
    out[0..4].copy_from_slice(&h.format.version().to_le_bytes());
    put_str(&mut out[4..68], &h.description);
    put_str(&mut out[68..80], &h.symbol);
    out[80..84].copy_from_slice(&h.period.to_le_bytes());
    out[84..88].copy_from_slice(&h.digits.to_le_bytes());
    out[88..92].copy_from_slice(&h.sync_mark.to_le_bytes());
    out[92..96].copy_from_slice(&h.prev_sync_mark.to_le_bytes());
    out[96..100].copy_from_slice(&h.period_flag.to_le_bytes());
    out[100..104].copy_from_slice(&h.timezone_id.to_le_bytes());
    out[104..148].copy_from_slice(&h.reserved);
    out
}

/// Decodes a header from the start of `bytes`.
///
/// Errors:
/// - [`FormatErrorKind::FileSizeInsufficient`] if fewer than 148 bytes are given
/// - [`FormatErrorKind::VersionUnsupported`] for versions other than 400/401
pub fn decode_header(bytes: &[u8]) -> Result<HistoryHeader, FormatErrorKind> {
    if bytes.len() < HEADER_SIZE {
        return Err(FormatErrorKind::FileSizeInsufficient);
    }
    let format = BarFormat::try_from(u32_at(bytes, 0))?;
    let mut reserved = [0u8; RESERVED_LEN];
    reserved.copy_from_slice(&bytes[104..148]);
    Ok(HistoryHeader {
        format,
        description: get_str(&bytes[4..4 + DESCRIPTION_LEN]),
        symbol: get_str(&bytes[68..80]),
        period: u32_at(bytes, 80),
        digits: u32_at(bytes, 84),
        sync_mark: i32_at(bytes, 88),
        prev_sync_mark: i32_at(bytes, 92),
        period_flag: u32_at(bytes, 96),
        timezone_id: u32_at(bytes, 100),
        reserved,
    })
}

fn put_str(field: &mut [u8], s: &str) {
    let n = s.len().min(field.len());
    field[..n].copy_from_slice(&s.as_bytes()[..n]);
}

fn get_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

// ----- bars -----

/// Appends the record for `bar` to `out`.
///
/// Format 400 stores the time as 32 bits and truncates wider values;
/// [`crate::file::HistoryFile`] rejects such bars before encoding.
pub fn encode_bar_into(format: BarFormat, bar: &Bar, out: &mut Vec<u8>) {
    match format {
        BarFormat::V400 => {
            out.extend_from_slice(&(bar.time as i32).to_le_bytes());
            out.extend_from_slice(&bar.open.to_le_bytes());
            out.extend_from_slice(&bar.low.to_le_bytes());
            out.extend_from_slice(&bar.high.to_le_bytes());
            out.extend_from_slice(&bar.close.to_le_bytes());
            out.extend_from_slice(&(bar.ticks as f64).to_le_bytes());
        }
        BarFormat::V401 => {
            out.extend_from_slice(&bar.time.to_le_bytes());
            out.extend_from_slice(&bar.open.to_le_bytes());
            out.extend_from_slice(&bar.high.to_le_bytes());
            out.extend_from_slice(&bar.low.to_le_bytes());
            out.extend_from_slice(&bar.close.to_le_bytes());
            out.extend_from_slice(&bar.ticks.to_le_bytes());
            out.extend_from_slice(&0i32.to_le_bytes());
            out.extend_from_slice(&0u64.to_le_bytes());
        }
    }
}

/// Encodes one bar record.
pub fn encode_bar(format: BarFormat, bar: &Bar) -> Vec<u8> {
    let mut out = Vec::with_capacity(format.bar_size());
    encode_bar_into(format, bar, &mut out);
    out
}

/// Encodes consecutive bar records.
pub fn encode_bars(format: BarFormat, bars: &[Bar]) -> Vec<u8> {
    let mut out = Vec::with_capacity(format.bar_size() * bars.len());
    for bar in bars {
        encode_bar_into(format, bar, &mut out);
    }
    out
}

/// Decodes one bar record from the start of `bytes`.
///
/// Errors:
/// - [`FormatErrorKind::ShortRecord`] if `bytes` is shorter than one record
pub fn decode_bar(format: BarFormat, bytes: &[u8]) -> Result<Bar, FormatErrorKind> {
    if bytes.len() < format.bar_size() {
        return Err(FormatErrorKind::ShortRecord);
    }
    let bar = match format {
        BarFormat::V400 => Bar {
            time: i64::from(i32_at(bytes, 0)),
            open: f64_at(bytes, 4),
            low: f64_at(bytes, 12),
            high: f64_at(bytes, 20),
            close: f64_at(bytes, 28),
            ticks: f64_at(bytes, 36) as u64,
        },
        BarFormat::V401 => Bar {
            time: i64_at(bytes, 0),
            open: f64_at(bytes, 8),
            high: f64_at(bytes, 16),
            low: f64_at(bytes, 24),
            close: f64_at(bytes, 32),
            ticks: u64_at(bytes, 40),
        },
    };
    Ok(bar)
}

/// Reads only the time field of a record.
pub fn decode_bar_time(format: BarFormat, bytes: &[u8]) -> Result<i64, FormatErrorKind> {
    match format {
        BarFormat::V400 if bytes.len() >= 4 => Ok(i64::from(i32_at(bytes, 0))),
        BarFormat::V401 if bytes.len() >= 8 => Ok(i64_at(bytes, 0)),
        _ => Err(FormatErrorKind::ShortRecord),
    }
}

fn array_at<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(&bytes[at..at + N]);
    buf
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(array_at(bytes, at))
}

fn i32_at(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes(array_at(bytes, at))
}

fn i64_at(bytes: &[u8], at: usize) -> i64 {
    i64::from_le_bytes(array_at(bytes, at))
}

fn u64_at(bytes: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(array_at(bytes, at))
}

pub(crate) fn f64_at(bytes: &[u8], at: usize) -> f64 {
    f64::from_le_bytes(array_at(bytes, at))
}
