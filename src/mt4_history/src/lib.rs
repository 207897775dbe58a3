//! MetaTrader 4 history files and the tools that maintain them.
//!
//! What this crate provides:
//! - [`codec`]: the 148-byte `.hst` header and the format 400/401 bar records.
//! - [`file`]: one `.hst` file of one symbol and period ([`file::HistoryFile`]),
//!   with append and overlap-replacing synchronize.
//! - [`set`] and [`registry`]: the nine files of a symbol as one
//!   [`set::HistorySet`], and the caller-owned [`registry::SetRegistry`] that
//!   keeps at most one open set per symbol and directory.
//! - [`locator`]: bisection over bar times without loading whole files.
//! - [`scaler`]: in-place arithmetic on the prices of a file.
//! - [`updater`]: the day-by-day update loop fed by a
//!   [`HistoryProvider`](history_source::providers::HistoryProvider).
//! - [`config`]: the TOML configuration of directories and instruments.
//!
//! All I/O is blocking. Nothing here is shared across threads.

#![deny(missing_docs)]

pub mod codec;
pub mod config;
pub mod error;
pub mod file;
pub mod locator;
pub mod registry;
pub mod scaler;
pub mod set;
pub mod updater;
