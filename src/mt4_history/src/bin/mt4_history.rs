use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, CommandFactory, Parser, Subcommand, error::ErrorKind};
use history_source::{
    catalog::CatalogRegistry,
    models::instrument::{Instrument, InstrumentKind},
    providers::{InstrumentRegistry, rost::RostHistory},
    synthetic::Synthesizer,
};
use indexmap::IndexMap;
use mt4_history::{
    config::{Config, load_config_path, resolve_config_path},
    registry::SetRegistry,
    scaler::{ScaleOp, ScaleRequest, parse_time_bound, scale_history, summary},
    updater::{CancellationToken, UpdateOptions, UpdateReport, update_instrument},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mt4-history", version, about = "Maintain MetaTrader 4 history files")]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply + - * or / to every price of a history file
    Scale {
        /// History file (format 400)
        file: PathBuf,
        /// Operator
        #[arg(value_parser = ["+", "-", "*", "/"])]
        op: String,
        /// Non-zero operand
        #[arg(allow_negative_numbers = true)]
        value: f64,
        /// First bar to modify (YYYY.MM.DD [HH:MM], GMT)
        #[arg(long, value_name = "DATETIME")]
        from: Option<String>,
        /// End of the range, exclusive; a bare date includes that day
        #[arg(long, value_name = "DATETIME")]
        to: Option<String>,
    },
    /// Update the MT4 history of the given (or all auto-update) instruments
    Update {
        /// Instrument names
        symbols: Vec<String>,
        /// Configuration file (default: $MT4_HISTORY_CONFIG)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };
    init_tracing(cli.verbose);

    let outcome = match cli.cmd {
        Cmd::Scale {
            file,
            op,
            value,
            from,
            to,
        } => match scale_request(&op, value, from.as_deref(), to.as_deref()) {
            Ok(request) => scale(&file, &request),
            Err(err) => return usage_error("scale", format!("{err:#}")),
        },
        Cmd::Update { symbols, config } => update(&symbols, config),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Prints `message` as a usage error of `subcommand` and fails.
fn usage_error(subcommand: &str, message: String) -> ExitCode {
    let mut cli = Cli::command();
    cli.build();
    let err = match cli.find_subcommand_mut(subcommand) {
        Some(cmd) => cmd.error(ErrorKind::ValueValidation, message),
        None => cli.error(ErrorKind::ValueValidation, message),
    };
    let _ = err.print();
    ExitCode::FAILURE
}

/// Checks the scale arguments before the file is touched.
fn scale_request(op: &str, value: f64, from: Option<&str>, to: Option<&str>) -> Result<ScaleRequest> {
    let op: ScaleOp = op.parse()?;
    let from = from
        .map(|s| parse_time_bound(s, false))
        .transpose()
        .context("invalid --from time")?;
    let to = to
        .map(|s| parse_time_bound(s, true))
        .transpose()
        .context("invalid --to time")?;
    let request = ScaleRequest {
        op,
        operand: value,
        from,
        to,
    };
    request.validate()?;
    Ok(request)
}

fn scale(file: &Path, request: &ScaleRequest) -> Result<()> {
    let modified = scale_history(file, request).with_context(|| format!("scale {}", file.display()))?;
    println!("{}", summary(file, modified));
    Ok(())
}

fn update(symbols: &[String], config: Option<PathBuf>) -> Result<()> {
    let path = resolve_config_path(config)?;
    let config = load_config_path(&path)?;
    let catalog = config.registry();
    let instruments = select_instruments(&config, &catalog, symbols)?;
    let opts = UpdateOptions {
        directory: config.history.mt4_directory.clone(),
        format: config.bar_format()?,
        today: None,
    };

    let cancel = CancellationToken::new();
    spawn_interrupt_listener(cancel.clone());

    let mut sets = SetRegistry::new();
    let mut outcome = Ok(());
    for instrument in &instruments {
        match update_one(&mut sets, &catalog, instrument, &opts, &cancel) {
            Ok(report) => {
                println!(
                    "{}: synchronized {} day(s), {} bar(s)",
                    report.symbol, report.days_synchronized, report.bars_written
                );
                if report.cancelled {
                    outcome = Err(anyhow::anyhow!("update interrupted"));
                    break;
                }
            }
            Err(err) => {
                outcome = Err(err);
                break;
            }
        }
    }
    let closed = sets.close_all()?;
    if closed > 0 {
        warn!(closed, "history sets left open were closed");
    }
    outcome
}

fn update_one(
    sets: &mut SetRegistry,
    catalog: &CatalogRegistry,
    instrument: &Instrument,
    opts: &UpdateOptions,
    cancel: &CancellationToken,
) -> Result<UpdateReport> {
    let report = match instrument.kind {
        InstrumentKind::Synthetic => {
            let mut provider = Synthesizer::new(instrument.clone(), catalog)?;
            update_instrument(sets, instrument, &mut provider, opts, cancel)
        }
        InstrumentKind::Forex | InstrumentKind::Metals => {
            let mut provider = RostHistory::new(catalog.store(), instrument.clone());
            update_instrument(sets, instrument, &mut provider, opts, cancel)
        }
    };
    report.with_context(|| format!("update {}", instrument.name))
}

/// Named instruments (deduplicated, in order), or every auto-update instrument.
fn select_instruments(config: &Config, catalog: &CatalogRegistry, symbols: &[String]) -> Result<Vec<Instrument>> {
    if symbols.is_empty() {
        let selected: Vec<Instrument> = config
            .instruments
            .iter()
            .filter(|(_, cfg)| cfg.auto_update)
            .filter_map(|(name, _)| catalog.find(name))
            .collect();
        info!(instruments = selected.len(), "updating all auto-update instruments");
        return Ok(selected);
    }
    let mut selected = IndexMap::new();
    for symbol in symbols {
        let Some(instrument) = catalog.find(symbol) else {
            bail!("unknown symbol \"{symbol}\"");
        };
        selected.entry(instrument.name.clone()).or_insert(instrument);
    }
    Ok(selected.into_values().collect())
}

/// Cancels `token` on Ctrl-C. The listener runs on its own thread and is
/// abandoned when the process exits.
fn spawn_interrupt_listener(token: CancellationToken) {
    let spawned = std::thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    warn!(error = %err, "Ctrl-C handling unavailable");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping after the current day");
                    token.cancel();
                }
            });
        });
    if let Err(err) = spawned {
        warn!(error = %err, "Ctrl-C handling unavailable");
    }
}
