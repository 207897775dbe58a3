//! Bar offset lookup by time.
//!
//! [`find_start_offset`] is a last-biased bisection over a store of bars
//! ordered by time. It does not return the classical lower bound: when a bar's
//! time equals the target, the result is usually the bar *after* it. What is
//! guaranteed:
//! - if even the first bar is newer than the target, the result is `0`;
//! - if the newest bar is not newer than the target, the result is `n - 1`;
//! - otherwise the result is the first bar with `time > target`, i.e. the
//!   upper end of the final two-bar window containing the transition.
//!
//! Only `ceil(log2(n)) + 2` reads are performed. Callers needing the exact
//! first index with `time >= target` use [`find_first_at_or_after`], which
//! steps back over equal times.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
};

use crate::{
    codec::{BarFormat, HEADER_SIZE, decode_bar_time},
    error::{HistoryError, Result},
};

/// Random access to the open times of a sequence of bars.
pub trait BarTimes {
    /// Number of bars.
    fn bar_count(&self) -> usize;

    /// Open time of the bar at `index`. Each call may cost one seek and read.
    fn time_at(&mut self, index: usize) -> Result<i64>;
}

impl BarTimes for Vec<i64> {
    fn bar_count(&self) -> usize {
        self.len()
    }

    fn time_at(&mut self, index: usize) -> Result<i64> {
        self.get(index)
            .copied()
            .ok_or_else(|| HistoryError::InvalidArgument(format!("bar index {index} out of range")))
    }
}

/// Bar times read straight from an open history file.
pub struct FileBarTimes<'f> {
    file: &'f mut File,
    format: BarFormat,
    count: usize,
    reads: usize,
    buf: Vec<u8>,
}

impl<'f> FileBarTimes<'f> {
    /// Wraps `file` holding `count` records of `format` after the header.
    pub fn new(file: &'f mut File, format: BarFormat, count: usize) -> Self {
        Self {
            file,
            format,
            count,
            reads: 0,
            buf: vec![0; format.bar_size()],
        }
    }

    /// Number of records read so far.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl BarTimes for FileBarTimes<'_> {
    fn bar_count(&self) -> usize {
        self.count
    }

    fn time_at(&mut self, index: usize) -> Result<i64> {
        if index >= self.count {
            return Err(HistoryError::InvalidArgument(format!(
                "bar index {index} out of range ({} bars)",
                self.count
            )));
        }
        let offset = HEADER_SIZE + index * self.format.bar_size();
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.read_exact(&mut self.buf)?;
        self.reads += 1;
        decode_bar_time(self.format, &self.buf).map_err(|kind| HistoryError::Format {
            kind,
            subject: format!("bar {index}"),
        })
    }
}

/// Offset of the bar at which a scan for `target` should start.
///
/// See the module docs for the exact edge semantics.
pub fn find_start_offset<S: BarTimes + ?Sized>(store: &mut S, target: i64) -> Result<usize> {
    let n = store.bar_count();
    if n == 0 || (n < 2 && target == 0) {
        return Ok(0);
    }

    let (mut first, mut last) = (0, n - 1);
    let mut first_time = store.time_at(first)?;
    let mut last_time = if last == first { first_time } else { store.time_at(last)? };

    loop {
        let remaining = last - first + 1;
        if first_time > target {
            return Ok(first);
        }
        if last_time <= target {
            return Ok(last);
        }
        if remaining <= 2 {
            return Ok(last);
        }
        let mid = first + remaining.div_ceil(2) - 1;
        let mid_time = store.time_at(mid)?;
        if mid_time <= target {
            first = mid;
            first_time = mid_time;
        } else {
            last = mid;
            last_time = mid_time;
        }
    }
}

/// Index of the first bar with `time >= target`, or `n` if there is none.
pub fn find_first_at_or_after<S: BarTimes + ?Sized>(store: &mut S, target: i64) -> Result<usize> {
    let n = store.bar_count();
    if n == 0 {
        return Ok(0);
    }
    let mut index = find_start_offset(store, target)?;
    while index > 0 && store.time_at(index - 1)? >= target {
        index -= 1;
    }
    if store.time_at(index)? < target {
        index += 1;
    }
    Ok(index)
}
