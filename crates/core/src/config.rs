//! Runner configuration.
//!
//! Values come from built-in defaults, then an optional TOML file in the
//! user's config directory, then `TYCOON_*` environment variables.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::info;

use crate::{
    engine::{EngineOptions, DEFAULT_MAX_OFFLINE_SECONDS},
    save::DEFAULT_STATE_KEY,
    scheduler::{SchedulerOptions, DEFAULT_MAX_TICK_SECONDS},
    store::FileStore,
    unit::{Tuning, DEFAULT_MIN_CYCLE_SECONDS},
    wallet::{DEFAULT_STARTING_BALANCE, DEFAULT_WALLET_KEY},
};

const APP_DIR: &str = "tycoon";
const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "TYCOON";

/// Contents written the first time no config file exists.
pub const DEFAULT_CONFIG: &str = r#"# Tycoon runner settings. Every key is optional.
# Environment variables prefixed with TYCOON_ override these values,
# e.g. TYCOON_TICK_INTERVAL_MS=250.

# save_root = "/path/to/saves"
# catalog_path = "/path/to/catalog.json"
state_key = "tycoon.state.v1"
wallet_key = "tycoon.wallet.v1"
starting_balance = 100.0

tick_interval_ms = 120
max_tick_seconds = 5.0
min_cycle_seconds = 0.05

offline_progress = true
max_offline_seconds = 28800.0
status_interval_secs = 30
"#;

/// Runner configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory the file store writes blobs into.
    pub save_root: PathBuf,
    /// Key of the simulation state blob.
    pub state_key: String,
    /// Key of the wallet blob.
    pub wallet_key: String,
    /// JSON catalog to load instead of the built-in one.
    pub catalog_path: Option<PathBuf>,
    /// Scheduler wake-up interval.
    pub tick_interval_ms: u64,
    /// Longest gap handled as an ordinary tick.
    pub max_tick_seconds: f64,
    /// Floor on every cycle length.
    pub min_cycle_seconds: f64,
    /// Balance a new wallet starts with.
    pub starting_balance: f64,
    /// Apply the time since the last save at startup.
    pub offline_progress: bool,
    /// Cap on offline catch-up.
    pub max_offline_seconds: f64,
    /// Seconds between status lines; `0` disables them.
    pub status_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            save_root: FileStore::default_root(),
            state_key: DEFAULT_STATE_KEY.to_string(),
            wallet_key: DEFAULT_WALLET_KEY.to_string(),
            catalog_path: None,
            tick_interval_ms: 120,
            max_tick_seconds: DEFAULT_MAX_TICK_SECONDS,
            min_cycle_seconds: DEFAULT_MIN_CYCLE_SECONDS,
            starting_balance: DEFAULT_STARTING_BALANCE,
            offline_progress: true,
            max_offline_seconds: DEFAULT_MAX_OFFLINE_SECONDS,
            status_interval_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load from the default config file and the process environment.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load from `path` (if it exists) and the process environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_with(path, environment())
    }

    fn load_with(path: &Path, env: Environment) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(env)
            .build()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;
        let config: AppConfig = settings
            .try_deserialize()
            .context("invalid configuration values")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            bail!("tick_interval_ms must be positive");
        }
        for (name, value) in [
            ("max_tick_seconds", self.max_tick_seconds),
            ("min_cycle_seconds", self.min_cycle_seconds),
        ] {
            if !value.is_finite() || value <= 0.0 {
                bail!("{name} must be a positive number, got {value}");
            }
        }
        for (name, value) in [
            ("starting_balance", self.starting_balance),
            ("max_offline_seconds", self.max_offline_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{name} must be a finite non-negative number, got {value}");
            }
        }
        if self.state_key.trim().is_empty() || self.wallet_key.trim().is_empty() {
            bail!("state_key and wallet_key must not be empty");
        }
        if self.state_key == self.wallet_key {
            bail!("state_key and wallet_key must differ");
        }
        Ok(())
    }

    /// Timing knobs for the engine.
    pub fn tuning(&self) -> Tuning {
        Tuning {
            min_cycle_seconds: self.min_cycle_seconds,
        }
    }

    /// Engine construction options.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            state_key: self.state_key.clone(),
            tuning: self.tuning(),
            max_offline_seconds: self.max_offline_seconds,
        }
    }

    /// Scheduler options.
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            interval: self.tick_interval(),
            max_tick_seconds: self.max_tick_seconds,
        }
    }

    /// Scheduler wake-up interval.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Status line interval, if enabled.
    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval_secs > 0).then(|| Duration::from_secs(self.status_interval_secs))
    }
}

/// Location of the config file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

/// Write [`DEFAULT_CONFIG`] to the default location unless a file exists.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = config_path();
    ensure_config_at(&path)?;
    Ok(path)
}

fn ensure_config_at(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write default config to {}", path.display()))?;
    info!(path = %path.display(), "wrote default configuration");
    Ok(())
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX).try_parsing(true)
}
