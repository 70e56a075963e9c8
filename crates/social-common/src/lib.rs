//! # social-common
//!
//! Shared utilities: environment-driven configuration and tracing setup.

pub mod config;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{
    AppConfig, AppSettings, ConfigError, ContentConfig, DatabaseSettings, Environment,
    TelemetrySettings,
};
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError,
};
