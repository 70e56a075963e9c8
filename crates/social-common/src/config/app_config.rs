//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub content: ContentConfig,
    pub telemetry: TelemetrySettings,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default)]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Database connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// Overrides the migrations directory baked in at build time
    #[serde(default)]
    pub migrations_dir: Option<String>,
}

/// Limits on stored content
#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_comment_max_length")]
    pub comment_max_length: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            comment_max_length: default_comment_max_length(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

// Default value functions
fn default_app_name() -> String {
    "social-graph".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    10
}

fn default_comment_max_length() -> usize {
    4000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a required variable is missing or a value does not parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV") {
            Some(raw) => Environment::parse(&raw)
                .ok_or(ConfigError::InvalidValue("APP_ENV", raw))?,
            None => Environment::default(),
        };

        Ok(Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env: environment,
            },
            database: DatabaseSettings {
                url: lookup("DATABASE_URL").ok_or(ConfigError::MissingVar("DATABASE_URL"))?,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", default_max_connections)?,
                min_connections: parse_or(&lookup, "DATABASE_MIN_CONNECTIONS", default_min_connections)?,
                acquire_timeout_secs: parse_or(
                    &lookup,
                    "DATABASE_ACQUIRE_TIMEOUT_SECS",
                    default_acquire_timeout_secs,
                )?,
                migrations_dir: lookup("DATABASE_MIGRATIONS_DIR").filter(|dir| !dir.trim().is_empty()),
            },
            content: ContentConfig {
                comment_max_length: parse_or(&lookup, "COMMENT_MAX_LENGTH", default_comment_max_length)?,
            },
            telemetry: TelemetrySettings {
                level: lookup("LOG_LEVEL").unwrap_or_else(default_log_level),
                json: parse_or(&lookup, "LOG_JSON", || environment.is_production())?,
            },
        })
    }
}

fn parse_or<F, T, D>(lookup: &F, key: &'static str, default: D) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    D: FnOnce() -> T,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
        None => Ok(default()),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
