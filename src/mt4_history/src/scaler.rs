//! In-place arithmetic on the prices of a history file.
//!
//! [`scale_history`] opens a file directly (no [`HistorySet`](crate::set::HistorySet)),
//! locates the first bar of the requested `[from, to)` window and rewrites
//! `open`, `high`, `low` and `close` of every bar inside it. Time and volume
//! bytes are left untouched. Transformed prices are rounded to the header's
//! digits.

use std::{
    fmt,
    fs::OpenOptions,
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
    str::FromStr,
};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use history_source::models::bar::round_price;
use tracing::{debug, info};

use crate::{
    codec::{BarFormat, HEADER_SIZE, decode_bar_time, decode_header, f64_at},
    error::{FormatErrorKind, HistoryError, Result},
    locator::{FileBarTimes, find_first_at_or_after},
};

/// Arithmetic operator applied to every price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleOp {
    /// `price + operand`
    Add,
    /// `price - operand`
    Subtract,
    /// `price * operand`
    Multiply,
    /// `price / operand`
    Divide,
}

impl ScaleOp {
    /// Applies the operator.
    pub fn apply(self, value: f64, operand: f64) -> f64 {
        match self {
            ScaleOp::Add => value + operand,
            ScaleOp::Subtract => value - operand,
            ScaleOp::Multiply => value * operand,
            ScaleOp::Divide => value / operand,
        }
    }
}

impl fmt::Display for ScaleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScaleOp::Add => "+",
            ScaleOp::Subtract => "-",
            ScaleOp::Multiply => "*",
            ScaleOp::Divide => "/",
        })
    }
}

impl FromStr for ScaleOp {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "+" => Ok(ScaleOp::Add),
            "-" => Ok(ScaleOp::Subtract),
            "*" => Ok(ScaleOp::Multiply),
            "/" => Ok(ScaleOp::Divide),
            other => Err(HistoryError::InvalidArgument(format!(
                "invalid scaling operator {other:?} (expected one of + - * /)"
            ))),
        }
    }
}

/// What to do to which bars.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleRequest {
    /// Operator.
    pub op: ScaleOp,
    /// Operand; must be finite and non-zero.
    pub operand: f64,
    /// Inclusive start time; `None` means start of file.
    pub from: Option<i64>,
    /// Exclusive end time; `None` means end of file.
    pub to: Option<i64>,
}

impl ScaleRequest {
    /// Checks the request before any file is touched.
    pub fn validate(&self) -> Result<()> {
        if !self.operand.is_finite() {
            return Err(HistoryError::InvalidArgument(format!(
                "invalid <value> (not a finite number): {}",
                self.operand
            )));
        }
        if self.operand == 0.0 {
            return Err(HistoryError::InvalidArgument("invalid <value> (zero)".into()));
        }
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(HistoryError::InvalidArgument("invalid --from/--to time range".into()));
            }
        }
        Ok(())
    }
}

/// Parses a `--from`/`--to` bound: `YYYY.MM.DD HH:MM` or `YYYY.MM.DD` (GMT).
///
/// A date without time means 00:00 of that day, or 00:00 of the next day when
/// `end_of_day` is set (so `--to=2022.01.06` includes all of Jan 6th).
pub fn parse_time_bound(s: &str, end_of_day: bool) -> Result<i64> {
    let s = s.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y.%m.%d %H:%M") {
        return Ok(dt.and_utc().timestamp());
    }
    match NaiveDate::parse_from_str(s, "%Y.%m.%d") {
        Ok(date) => {
            let midnight = date.and_time(chrono::NaiveTime::MIN).and_utc();
            let ts = if end_of_day { midnight + Duration::days(1) } else { midnight };
            Ok(ts.timestamp())
        }
        Err(_) => Err(HistoryError::InvalidArgument(format!("invalid time {s:?}"))),
    }
}

/// Scales the bars of `path` in place and returns how many were modified.
///
/// Errors:
/// - [`HistoryError::InvalidArgument`] for an invalid request (nothing is opened)
/// - [`HistoryError::Format`] for undersized, unknown-version or ragged files
/// - [`HistoryError::Unimplemented`] for files other than format 400
pub fn scale_history(path: &Path, req: &ScaleRequest) -> Result<usize> {
    req.validate()?;

    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let size = file.metadata()?.len() as usize;
    if size < HEADER_SIZE {
        return Err(HistoryError::format(FormatErrorKind::FileSizeInsufficient, path));
    }
    let mut raw = [0u8; HEADER_SIZE];
    file.read_exact(&mut raw)?;
    let header = decode_header(&raw).map_err(|kind| HistoryError::format(kind, path))?;
    let format = header.format;
    let bar_size = format.bar_size();
    if (size - HEADER_SIZE) % bar_size != 0 {
        return Err(HistoryError::format(FormatErrorKind::BarBoundary, path));
    }
    if format != BarFormat::V400 {
        return Err(HistoryError::Unimplemented(format!(
            "processing of history format {} in {}",
            format.version(),
            path.display()
        )));
    }
    let count = (size - HEADER_SIZE) / bar_size;
    let from = req.from.unwrap_or(0);
    let to = req.to.unwrap_or(i64::MAX);

    let (start, reads) = {
        let mut times = FileBarTimes::new(&mut file, format, count);
        (find_first_at_or_after(&mut times, from)?, times.reads())
    };
    debug!(path = %path.display(), start, count, reads, "scaling from bar");

    let offsets = format.price_offsets();
    let mut record = vec![0u8; bar_size];
    let mut modified = 0;
    file.seek(SeekFrom::Start((HEADER_SIZE + start * bar_size) as u64))?;
    for _ in start..count {
        file.read_exact(&mut record)?;
        let time = decode_bar_time(format, &record).map_err(|kind| HistoryError::format(kind, path))?;
        if time < from {
            continue;
        }
        if time >= to {
            break;
        }
        for at in offsets {
            let value = req.op.apply(f64_at(&record, at), req.operand);
            record[at..at + 8].copy_from_slice(&round_price(value, header.digits).to_le_bytes());
        }
        file.seek(SeekFrom::Current(-(bar_size as i64)))?;
        file.write_all(&record)?;
        modified += 1;
    }
    file.sync_data()?;

    info!(path = %path.display(), op = %req.op, operand = req.operand, modified, "scaled history");
    Ok(modified)
}

/// `EURUSD1.hst: modified 3 bars`
pub fn summary(path: &Path, modified: usize) -> String {
    let plural = if modified == 1 { "" } else { "s" };
    format!("{}: modified {modified} bar{plural}", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_parse_and_display() {
        for s in ["+", "-", "*", "/"] {
            assert_eq!(s.parse::<ScaleOp>().unwrap().to_string(), s);
        }
        assert!(matches!("x".parse::<ScaleOp>(), Err(HistoryError::InvalidArgument(_))));
    }

    #[test]
    fn zero_and_non_finite_operands_are_rejected() {
        for operand in [0.0, f64::NAN, f64::INFINITY] {
            let req = ScaleRequest { op: ScaleOp::Divide, operand, from: None, to: None };
            assert!(matches!(req.validate(), Err(HistoryError::InvalidArgument(_))));
        }
    }

    #[test]
    fn inverted_range_is_rejected() {
        let req = ScaleRequest { op: ScaleOp::Add, operand: 1.0, from: Some(120), to: Some(60) };
        assert!(req.validate().is_err());
        let req = ScaleRequest { from: Some(60), to: Some(60), ..req };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn time_bounds() {
        // 2022-01-03 00:00 GMT
        let day = 1_641_168_000;
        assert_eq!(parse_time_bound("2022.01.03", false).unwrap(), day);
        assert_eq!(parse_time_bound("2022.01.03", true).unwrap(), day + 86_400);
        assert_eq!(parse_time_bound("2022.01.03 17:55", true).unwrap(), day + 17 * 3600 + 55 * 60);
        assert!(parse_time_bound("2022-01-03", false).is_err());
        assert!(parse_time_bound("2022.13.01", false).is_err());
    }

    #[test]
    fn summary_pluralizes() {
        insta::assert_snapshot!(summary(Path::new("EURUSD1.hst"), 1), @"EURUSD1.hst: modified 1 bar");
        insta::assert_snapshot!(summary(Path::new("EURUSD1.hst"), 0), @"EURUSD1.hst: modified 0 bars");
    }
}
