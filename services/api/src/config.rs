//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use reqwest::Url;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub bridge_url: Url,
    pub auth_data_path: PathBuf,
    pub cors_origin: String,
    pub init_max_attempts: u32,
    pub init_backoff: Duration,
    pub restart_on_auth_failure: bool,
    pub max_auth_restarts: u32,
    pub reset_delay: Duration,
    pub export_default_limit: usize,
    pub export_default_context_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            log_level: Level::INFO,
            bridge_url: Url::parse("http://127.0.0.1:3001").expect("default bridge URL is valid"),
            auth_data_path: PathBuf::from("./.wwebjs_auth"),
            cors_origin: "http://localhost:3000".to_string(),
            init_max_attempts: 3,
            init_backoff: Duration::from_millis(2000),
            restart_on_auth_failure: true,
            max_auth_restarts: 3,
            reset_delay: Duration::from_millis(1000),
            export_default_limit: 100,
            export_default_context_window: 5,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        // --- Server Settings ---
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", defaults.bind_address)?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = lookup("CORS_ORIGIN").unwrap_or(defaults.cors_origin);

        // --- Messaging Client Settings ---
        let bridge_url = match lookup("BRIDGE_URL") {
            Some(raw) => Url::parse(&raw)
                .map_err(|e| ConfigError::InvalidValue("BRIDGE_URL".to_string(), e.to_string()))?,
            None => defaults.bridge_url,
        };
        let auth_data_path = lookup("AUTH_DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.auth_data_path);

        // --- Supervisor Settings ---
        let init_max_attempts = parse_or(&lookup, "INIT_MAX_ATTEMPTS", defaults.init_max_attempts)?;
        if init_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "INIT_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let init_backoff = Duration::from_millis(parse_or(&lookup, "INIT_BACKOFF_MS", 2000u64)?);
        let restart_on_auth_failure =
            parse_or(&lookup, "RESTART_ON_AUTH_FAILURE", defaults.restart_on_auth_failure)?;
        let max_auth_restarts = parse_or(&lookup, "MAX_AUTH_RESTARTS", defaults.max_auth_restarts)?;
        let reset_delay = Duration::from_millis(parse_or(&lookup, "RESET_DELAY_MS", 1000u64)?);

        // --- Export Defaults ---
        let export_default_limit =
            parse_or(&lookup, "EXPORT_DEFAULT_LIMIT", defaults.export_default_limit)?;
        let export_default_context_window = parse_or(
            &lookup,
            "EXPORT_DEFAULT_CONTEXT_WINDOW",
            defaults.export_default_context_window,
        )?;

        Ok(Self {
            bind_address,
            log_level,
            bridge_url,
            auth_data_path,
            cors_origin,
            init_max_attempts,
            init_backoff,
            restart_on_auth_failure,
            max_auth_restarts,
            reset_delay,
            export_default_limit,
            export_default_context_window,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
