//! Configuration: parsing, normalization, and loading.
//!
//! ```toml
//! [history]
//! mt4_directory = "data/history/mt4/XTrade-Testhistory"
//! rost_directory = "data/history"
//! format = 400
//!
//! [instruments.EURUSD]
//! type = "forex"
//! digits = 5
//! ```
//!
//! Relative directories are resolved against the directory of the
//! configuration file. The instrument table is normalized with
//! [`normalize_instruments`] right after parsing.
//!
//! Entrypoints:
//! - Parse + normalize from a TOML string: [`load_config_str`]
//! - Parse + normalize from a file path: [`load_config_path`]
//! - Locate the file from `--config` or [`CONFIG_ENV_VAR`]: [`resolve_config_path`]

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use history_source::{
    catalog::{CatalogRegistry, InstrumentCfg, normalize_instruments},
    providers::rost::RostStore,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use shared_utils::env::get_env_path;
use tracing::debug;

use crate::codec::BarFormat;

/// Environment variable naming the configuration file when `--config` is absent.
pub const CONFIG_ENV_VAR: &str = "MT4_HISTORY_CONFIG";

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directories and file format.
    pub history: HistoryCfg,
    /// Known instruments by (normalized) name.
    #[serde(default)]
    pub instruments: IndexMap<String, InstrumentCfg>,
}

/// The `[history]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryCfg {
    /// MT4 server directory receiving `.hst` files.
    pub mt4_directory: PathBuf,
    /// Root of the Rosatrader M1 bar files.
    pub rost_directory: PathBuf,
    /// Format of newly created history files (400 or 401).
    #[serde(default = "default_format")]
    pub format: u32,
}

fn default_format() -> u32 {
    400
}

impl Config {
    /// Record layout for new history files.
    pub fn bar_format(&self) -> anyhow::Result<BarFormat> {
        BarFormat::from_version(self.history.format)
            .with_context(|| format!("unsupported history format {}", self.history.format))
    }

    /// Instrument registry over the configured Rosatrader directory.
    pub fn registry(&self) -> CatalogRegistry {
        CatalogRegistry::new(&self.instruments, RostStore::new(&self.history.rost_directory))
    }

    fn rebase(&mut self, base: &Path) {
        for dir in [&mut self.history.mt4_directory, &mut self.history.rost_directory] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }
}

/// Parse and normalize a configuration from a TOML string.
///
/// Directories are taken as written; see [`load_config_path`] for rebasing.
///
/// Errors:
/// - TOML parse failures
/// - An unsupported `history.format`
/// - Instrument normalization errors
pub fn load_config_str(toml_str: &str) -> anyhow::Result<Config> {
    let mut config: Config = toml::from_str(toml_str).context("failed to parse configuration TOML")?;
    config.bar_format()?;
    let report = normalize_instruments(&mut config.instruments).context("invalid [instruments] table")?;
    debug!(
        instruments = config.instruments.len(),
        renamed = report.instruments_renamed,
        "configuration normalized"
    );
    Ok(config)
}

/// Read a configuration file from disk, parse, normalize and rebase it.
pub fn load_config_path(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).with_context(|| format!("read config file {}", path.display()))?;
    let mut config = load_config_str(&text).with_context(|| format!("load config file {}", path.display()))?;
    if let Some(base) = path.parent() {
        config.rebase(base);
    }
    Ok(config)
}

/// The configuration file to use: `explicit` if given, else [`CONFIG_ENV_VAR`].
pub fn resolve_config_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    match get_env_path(CONFIG_ENV_VAR) {
        Ok(path) => Ok(path),
        Err(err) => bail!("no --config given and {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use history_source::models::instrument::InstrumentKind;

    const SAMPLE: &str = r#"
        [history]
        mt4_directory = "mt4"
        rost_directory = "/var/rost"

        [instruments." eurusd "]
        type = "forex"
        digits = 5

        [instruments.USDLFX]
        type = "synthetic"
        digits = 5
        description = "  LiteForex US dollar index "
        history_m1_start = "2019-01-02"
        auto_update = false
    "#;

    #[test]
    fn parses_and_normalizes() {
        let config = load_config_str(SAMPLE).unwrap();
        assert_eq!(config.history.format, 400);
        assert_eq!(config.bar_format().unwrap(), BarFormat::V400);
        let names: Vec<&str> = config.instruments.keys().map(String::as_str).collect();
        assert_eq!(names, ["EURUSD", "USDLFX"]);

        let lfx = &config.instruments["USDLFX"];
        assert_eq!(lfx.kind, InstrumentKind::Synthetic);
        assert_eq!(lfx.description.as_deref(), Some("LiteForex US dollar index"));
        assert!(!lfx.auto_update);
        assert!(config.instruments["EURUSD"].auto_update);
    }

    #[test]
    fn unknown_keys_and_formats_are_rejected() {
        let err = load_config_str("[history]\nmt4_directory = \"a\"\nrost_directory = \"b\"\nspeed = 1\n").unwrap_err();
        assert!(format!("{err:#}").contains("speed"));

        let err = load_config_str("[history]\nmt4_directory = \"a\"\nrost_directory = \"b\"\nformat = 402\n").unwrap_err();
        assert!(err.to_string().contains("unsupported history format 402"));
    }

    #[test]
    fn colliding_instrument_names_are_rejected() {
        let toml = r#"
            [history]
            mt4_directory = "a"
            rost_directory = "b"
            [instruments.eurusd]
            type = "forex"
            digits = 5
            [instruments.EURUSD]
            type = "forex"
            digits = 5
        "#;
        let err = load_config_str(toml).unwrap_err();
        assert!(format!("{err:#}").contains("EURUSD"));
    }

    #[test]
    fn relative_directories_follow_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("history.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = load_config_path(&path).unwrap();
        assert_eq!(config.history.mt4_directory, dir.path().join("mt4"));
        assert_eq!(config.history.rost_directory, PathBuf::from("/var/rost"));
    }

    #[test]
    fn registry_resolves_configured_instruments() {
        use history_source::providers::InstrumentRegistry;

        let config = load_config_str(SAMPLE).unwrap();
        let registry = config.registry();
        let eurusd = registry.find("eurusd").unwrap();
        assert_eq!(eurusd.digits, 5);
        assert!(registry.find("GBPUSD").is_none());
    }

    #[test]
    fn explicit_path_wins_over_environment() {
        let explicit = PathBuf::from("explicit.toml");
        assert_eq!(resolve_config_path(Some(explicit.clone())).unwrap(), explicit);
    }
}
