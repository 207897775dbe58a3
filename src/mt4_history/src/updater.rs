//! Day-by-day update of an instrument's MT4 history.
//!
//! [`update_instrument`] resumes from the set's last sync mark (or the
//! provider's history start for a new set), walks FXT days up to but excluding
//! today and synchronizes each trading day's M1 bars. The sync mark is the
//! only resumption checkpoint, so an aborted run simply starts over with the
//! last synchronized day.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use history_source::{
    fxt::{SECS_PER_DAY, day_start, format_day, format_month, format_time, fxt_now, month},
    models::{instrument::Instrument, period::Period},
    providers::HistoryProvider,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    codec::BarFormat,
    error::{HistoryError, Result},
    registry::{SetOrigin, SetRegistry},
};

/// Cooperative cancellation flag, checked between days.
///
/// Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where and how to write history.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// MT4 server directory receiving the `.hst` files.
    pub directory: PathBuf,
    /// Format of newly created files.
    pub format: BarFormat,
    /// FXT timestamp standing in for "now"; `None` uses the clock.
    pub today: Option<i64>,
}

/// Outcome of one instrument update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateReport {
    /// Instrument name.
    pub symbol: String,
    /// Whether the history set was created by this run.
    pub created: bool,
    /// First processed day (`Mon, 03-Jan-2022`), if any.
    pub first_day: Option<String>,
    /// Last processed day, if any.
    pub last_day: Option<String>,
    /// Trading days synchronized.
    pub days_synchronized: usize,
    /// Non-trading days passed over.
    pub days_skipped: usize,
    /// M1 bars written.
    pub bars_written: usize,
    /// Whether the run stopped early on request.
    pub cancelled: bool,
}

/// Brings the history of `instrument` in `opts.directory` up to date.
///
/// The set is closed and unregistered on every path, including errors.
///
/// Errors:
/// - [`HistoryError::MissingData`] if a trading day has no bars or the provider
///   knows no history start
/// - [`HistoryError::Source`] for provider failures (e.g. a compressed day)
/// - any error of [`SetRegistry::get_or_create`] and `synchronize`
pub fn update_instrument(
    registry: &mut SetRegistry,
    instrument: &Instrument,
    provider: &mut dyn HistoryProvider,
    opts: &UpdateOptions,
    cancel: &CancellationToken,
) -> Result<UpdateReport> {
    info!(symbol = %instrument.name, "updating history");
    let outcome = run(registry, instrument, provider, opts, cancel);
    let closed = registry.close(&instrument.name, &opts.directory);
    match (outcome, closed) {
        (Ok(report), Ok(_)) => {
            info!(
                symbol = %instrument.name,
                days = report.days_synchronized,
                bars = report.bars_written,
                cancelled = report.cancelled,
                "history updated"
            );
            Ok(report)
        }
        (Ok(_), Err(err)) => Err(err),
        (Err(err), closed) => {
            if let Err(close_err) = closed {
                warn!(symbol = %instrument.name, error = %close_err, "closing history set failed");
            }
            Err(err)
        }
    }
}

fn run(
    registry: &mut SetRegistry,
    instrument: &Instrument,
    provider: &mut dyn HistoryProvider,
    opts: &UpdateOptions,
    cancel: &CancellationToken,
) -> Result<UpdateReport> {
    let symbol = instrument.name.as_str();
    let (origin, set) = registry.get_or_create(symbol, instrument.digits, opts.format, &opts.directory)?;
    let mut report = UpdateReport {
        symbol: symbol.to_string(),
        created: origin == SetOrigin::NewFromScratch,
        ..UpdateReport::default()
    };

    let last_sync = set.last_sync_time()?.filter(|&t| t > 0);
    debug!(symbol, last_sync = ?last_sync.map(format_time), "resolved last sync time");
    let start = match last_sync {
        Some(t) => t,
        None => provider.history_start(Period::M1)?.ok_or_else(|| {
            HistoryError::MissingData(format!("{symbol}: no M1 history start available"))
        })?,
    };
    let history_end = provider.history_end(Period::M1)?;
    debug!(symbol, history_end = ?history_end.map(format_day), "resolved stored history end");
    let today = day_start(opts.today.unwrap_or_else(fxt_now));

    let mut last_month = None;
    let mut day = day_start(start);
    while day < today {
        if cancel.is_cancelled() {
            info!(symbol, day = %format_day(day), "update cancelled");
            report.cancelled = true;
            break;
        }
        let m = month(day);
        if last_month != Some(m) {
            info!(symbol, month = %format_month(day), "processing");
            last_month = Some(m);
        }
        report.first_day.get_or_insert_with(|| format_day(day));
        report.last_day = Some(format_day(day));

        if !instrument.is_trading_day(day) {
            report.days_skipped += 1;
        } else {
            let bars = provider.history(Period::M1, day)?;
            if bars.is_empty() {
                let reason = match history_end {
                    Some(end) if day > end => format!(" (stored history ends {})", format_day(end)),
                    _ => String::new(),
                };
                return Err(HistoryError::MissingData(format!(
                    "{symbol}: history for {} not found{reason}",
                    format_day(day)
                )));
            }
            debug!(symbol, day = %format_day(day), bars = bars.len(), "synchronizing");
            report.bars_written += set.synchronize(&bars)?;
            report.days_synchronized += 1;
        }
        day += SECS_PER_DAY;
    }
    Ok(report)
}
