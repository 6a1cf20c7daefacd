//! Runtime configuration.
//!
//! Layered lowest to highest: built-in defaults, the TOML file named by
//! `--config`, then `STRATA_*` environment variables (`__` separates nested
//! keys, e.g. `STRATA_MAINTENANCE__LOOKBACK_DAYS=7`).

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use serde::Deserialize;
use strata_core::maintain::MaintainerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  /// SQLite database file; `~/` is expanded.
  pub store_path:  PathBuf,
  pub host:        String,
  pub port:        u16,
  #[serde(default)]
  pub maintenance: MaintainerConfig,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
  Config::builder()
    .set_default("store_path", "strata.db")?
    .set_default("host", "127.0.0.1")?
    .set_default("port", 8080)
}

impl Settings {
  pub fn load(file: &Path) -> anyhow::Result<Self> {
    let settings: Settings = defaults()?
      .add_source(File::from(file).required(false))
      .add_source(
        Environment::with_prefix("STRATA")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .with_context(|| format!("failed to read config from {}", file.display()))?
      .try_deserialize()
      .context("failed to deserialise Settings")?;
    Ok(settings.expanded())
  }

  fn expanded(mut self) -> Self {
    self.store_path = expand_tilde(&self.store_path);
    self
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
