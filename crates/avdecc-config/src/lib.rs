//! Shared configuration for AVDECC controller applications.
//!
//! A TOML file with `[controller]` and `[logging]` tables, layered as
//! built-in defaults < config file < `AVDECC_` environment variables, and
//! translated into `avdecc_core::ControllerConfig`. Also installs the
//! `tracing` subscriber described by the `[logging]` table.
//!
//! Environment keys use a double underscore between table and field:
//! `AVDECC_CONTROLLER__MAX_QUERY_RETRIES=4`, `AVDECC_LOGGING__JSON=true`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use avdecc_core::ControllerConfig;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[controller]` table. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ControllerSettings {
    pub preferred_locale: String,
    pub full_static_enumeration: bool,
    pub strict_sanity_checks: bool,
    pub packed_dynamic_info: bool,
    pub max_packed_queries: usize,
    pub scheduler_tick_ms: u64,
    pub identify_window_ms: u64,
    pub max_query_retries: u32,
    pub retry_delay_ms: u64,
    pub event_channel_size: usize,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for ControllerSettings {
    fn default() -> Self {
        let defaults = ControllerConfig::default();
        Self {
            preferred_locale: defaults.preferred_locale,
            full_static_enumeration: defaults.full_static_enumeration,
            strict_sanity_checks: defaults.strict_sanity_checks,
            packed_dynamic_info: defaults.packed_dynamic_info,
            max_packed_queries: defaults.max_packed_queries,
            scheduler_tick_ms: millis(defaults.scheduler_tick),
            identify_window_ms: millis(defaults.identify_window),
            max_query_retries: defaults.max_query_retries,
            retry_delay_ms: millis(defaults.retry_delay),
            event_channel_size: defaults.event_channel_size,
        }
    }
}

/// `[logging]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `avdecc_core=debug`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

// ── Validation / translation ────────────────────────────────────────

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.controller;
        if c.preferred_locale.trim().is_empty() {
            return Err(invalid("controller.preferred_locale", "must not be empty"));
        }
        if c.max_packed_queries == 0 {
            return Err(invalid("controller.max_packed_queries", "must be at least 1"));
        }
        if c.scheduler_tick_ms == 0 {
            return Err(invalid("controller.scheduler_tick_ms", "must be at least 1"));
        }
        if c.event_channel_size == 0 {
            return Err(invalid("controller.event_channel_size", "must be at least 1"));
        }
        EnvFilter::try_new(&self.logging.level)
            .map_err(|e| invalid("logging.level", &e.to_string()))?;
        Ok(())
    }

    /// Validate and build the runtime controller configuration.
    pub fn to_controller_config(&self) -> Result<ControllerConfig, ConfigError> {
        self.validate()?;
        let c = &self.controller;
        Ok(ControllerConfig {
            preferred_locale: c.preferred_locale.clone(),
            full_static_enumeration: c.full_static_enumeration,
            strict_sanity_checks: c.strict_sanity_checks,
            packed_dynamic_info: c.packed_dynamic_info,
            max_packed_queries: c.max_packed_queries,
            scheduler_tick: Duration::from_millis(c.scheduler_tick_ms),
            identify_window: Duration::from_millis(c.identify_window_ms),
            max_query_retries: c.max_query_retries,
            retry_delay: Duration::from_millis(c.retry_delay_ms),
            event_channel_size: c.event_channel_size,
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "avdecc", "avdecc").map_or_else(
        || PathBuf::from(".avdecc").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// The provider stack for a config file at `path`.
pub fn config_figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("AVDECC_").split("__"))
}

/// Load and validate the config at `path`. A missing file yields the
/// defaults (plus any environment overrides).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = config_figment(path).extract()?;
    config.validate()?;
    Ok(config)
}

/// Load the config from the canonical path.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

// ── Config saving ───────────────────────────────────────────────────

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Logging ─────────────────────────────────────────────────────────

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the
/// configured level. Fails if a subscriber is already installed.
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .map_err(|e| invalid("logging.level", &e.to_string()))?,
    };

    let installed = if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };
    installed.map_err(|e| ConfigError::Tracing(e.to_string()))
}
