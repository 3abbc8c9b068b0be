//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.xbot/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct XbotConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct GeneralConfig {
    pub session_id: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    pub base_url: Option<String>,
    pub send_path: Option<String>,
    pub history_path: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Capacity of the view event channel.
    pub event_buffer: Option<usize>,
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_SEND_PATH: &str = "/api/send";
pub const DEFAULT_HISTORY_PATH: &str = "/api/history";
pub const DEFAULT_SESSION_ID: &str = "1";
pub const DEFAULT_LOG_FILE: &str = "xbot.log";
pub const DEFAULT_EVENT_BUFFER: usize = 64;

// ============================================================================
// Resolved Config (concrete values, no Options)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub base_url: String,
    pub send_path: String,
    pub history_path: String,
    pub session_id: String,
    pub log_level: log::LevelFilter,
    pub log_file: String,
    pub event_buffer: usize,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            send_path: DEFAULT_SEND_PATH.to_string(),
            history_path: DEFAULT_HISTORY_PATH.to_string(),
            session_id: DEFAULT_SESSION_ID.to_string(),
            log_level: log::LevelFilter::Debug,
            log_file: DEFAULT_LOG_FILE.to_string(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Loading
// ============================================================================

/// Returns the path to `~/.xbot/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".xbot").join("config.toml"))
}

/// Load config from `~/.xbot/config.toml`.
///
/// If the file doesn't exist, generates a commented-out default and
/// returns `XbotConfig::default()`.
pub fn load_config() -> Result<XbotConfig, ConfigError> {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => {
            warn!("Could not determine home directory, using default config");
            Ok(XbotConfig::default())
        }
    }
}

/// Load config from an explicit path. Malformed files are an error.
pub fn load_config_from(path: &Path) -> Result<XbotConfig, ConfigError> {
    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(path);
        return Ok(XbotConfig::default());
    }

    let contents = fs::read_to_string(path)?;
    let config: XbotConfig = toml::from_str(&contents)?;
    info!("Loaded config from {}", path.display());
    debug!("Config: {:?}", config);
    Ok(config)
}

fn generate_default_config(path: &Path) {
    let default_content = r#"# xbot Configuration
# All settings are optional; defaults are used for anything not specified.
# Override hierarchy: defaults → this file → env vars → CLI flags.

# [general]
# session_id = "1"                   # Or set XBOT_SESSION_ID env var
# log_level = "debug"                # "off", "error", "warn", "info", "debug", "trace"
# log_file = "xbot.log"

# [server]
# base_url = "http://localhost:5000" # Or set XBOT_BASE_URL env var
# send_path = "/api/send"
# history_path = "/api/history"

# [stream]
# event_buffer = 64                  # Pending view events before snapshots are skipped
"#;

    if let Some(parent) = path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!("Failed to create config directory: {}", e);
        return;
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// CLI overrides (None = flag not given).
#[derive(Debug, Default)]
pub struct CliOverrides<'a> {
    pub base_url: Option<&'a str>,
    pub session_id: Option<&'a str>,
}

/// Resolve the final config by collapsing: defaults → config file → env vars → CLI.
pub fn resolve(config: &XbotConfig, cli: &CliOverrides<'_>) -> ResolvedConfig {
    resolve_with_env(config, cli, |key| std::env::var(key).ok())
}

/// Like `resolve`, with the environment supplied by `env`.
pub fn resolve_with_env(
    config: &XbotConfig,
    cli: &CliOverrides<'_>,
    env: impl Fn(&str) -> Option<String>,
) -> ResolvedConfig {
    let defaults = ResolvedConfig::default();

    // Base URL: CLI → env → config → default
    let base_url = cli
        .base_url
        .map(str::to_string)
        .or_else(|| env("XBOT_BASE_URL"))
        .or_else(|| config.server.base_url.clone())
        .unwrap_or(defaults.base_url);

    // Session: CLI → env → config → default
    let session_id = cli
        .session_id
        .map(str::to_string)
        .or_else(|| env("XBOT_SESSION_ID"))
        .or_else(|| config.general.session_id.clone())
        .unwrap_or(defaults.session_id);

    let log_level = match config.general.log_level.as_deref() {
        Some(raw) => raw.parse::<log::LevelFilter>().unwrap_or_else(|_| {
            warn!("Unknown log level {:?}, using {}", raw, defaults.log_level);
            defaults.log_level
        }),
        None => defaults.log_level,
    };

    ResolvedConfig {
        base_url,
        send_path: config.server.send_path.clone().unwrap_or(defaults.send_path),
        history_path: config
            .server
            .history_path
            .clone()
            .unwrap_or(defaults.history_path),
        session_id,
        log_level,
        log_file: config.general.log_file.clone().unwrap_or(defaults.log_file),
        event_buffer: config
            .stream
            .event_buffer
            .filter(|&n| n > 0)
            .unwrap_or(defaults.event_buffer),
    }
}
