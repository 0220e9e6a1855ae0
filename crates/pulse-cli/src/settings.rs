//! Binary configuration: `pulse.toml` layered under `PULSE_` environment
//! variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use pulse_engine::EngineConfig;
use serde::Deserialize;

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/pulse/pulse.db") }
fn default_reports_dir() -> PathBuf { PathBuf::from("reports") }
fn default_endpoint() -> String {
  "https://generativelanguage.googleapis.com/v1beta/models".to_owned()
}
fn default_model() -> String { "gemini-2.5-pro".to_owned() }
fn default_generator_timeout_secs() -> u64 { 60 }

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  #[serde(default = "default_store_path")]
  pub store_path:  PathBuf,
  /// Directory scanned for raw `*.csv` trade logs.
  pub feed_dir:    PathBuf,
  #[serde(default = "default_reports_dir")]
  pub reports_dir: PathBuf,
  #[serde(default)]
  pub generator:   GeneratorSettings,
  #[serde(default)]
  pub engine:      EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorSettings {
  #[serde(default = "default_endpoint")]
  pub endpoint:     String,
  #[serde(default)]
  pub api_key:      String,
  #[serde(default = "default_model")]
  pub model:        String,
  #[serde(default = "default_generator_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for GeneratorSettings {
  fn default() -> Self {
    Self {
      endpoint:     default_endpoint(),
      api_key:      String::new(),
      model:        default_model(),
      timeout_secs: default_generator_timeout_secs(),
    }
  }
}

impl Settings {
  /// Read `path` (optional) and the environment. Nested keys use `__`, e.g.
  /// `PULSE_ENGINE__TIMEZONE=Europe/London`.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("PULSE")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read config file")?;

    let mut settings: Settings = settings
      .try_deserialize()
      .context("failed to deserialise Settings")?;

    settings.store_path = expand_tilde(&settings.store_path);
    settings.feed_dir = expand_tilde(&settings.feed_dir);
    settings.reports_dir = expand_tilde(&settings.reports_dir);
    Ok(settings)
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
