//! Engine configuration
//!
//! Every setting can come from a flag or the environment; a `.env` file is loaded first when
//! present.

use std::time::Duration;

use clap::Args;
use jiff::tz::TimeZone;
use rusty_money::iso::{self, Currency};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown currency code {0}")]
    UnknownCurrency(String),

    #[error("unknown time zone {name}")]
    UnknownTimeZone {
        name: String,
        #[source]
        source: jiff::Error,
    },
}

/// Storefront backend settings.
#[derive(Debug, Clone, Args)]
pub struct BackendConfig {
    /// Base URL of the storefront REST API
    #[arg(long, env = "QUIRE_API_BASE_URL", default_value = "http://localhost:8080/api")]
    pub api_base_url: String,

    /// Bearer token sent with every request
    #[arg(long, env = "QUIRE_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "QUIRE_REQUEST_TIMEOUT_MS", default_value_t = 10_000)]
    pub request_timeout_ms: u64,

    /// ISO 4217 code of the store currency
    #[arg(long, env = "QUIRE_CURRENCY", default_value = "VND")]
    pub currency: String,

    /// Time zone the backend's local date-times are in
    #[arg(long, env = "QUIRE_TIME_ZONE", default_value = "UTC")]
    pub time_zone: String,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Resolve the configured currency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownCurrency`] for codes `rusty_money` does not know.
    pub fn currency(&self) -> Result<&'static Currency, ConfigError> {
        iso::find(&self.currency.to_uppercase())
            .ok_or_else(|| ConfigError::UnknownCurrency(self.currency.clone()))
    }

    /// Resolve the configured time zone.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownTimeZone`] when the zone is not in the tz database.
    pub fn time_zone(&self) -> Result<TimeZone, ConfigError> {
        if self.time_zone.eq_ignore_ascii_case("UTC") {
            return Ok(TimeZone::UTC);
        }

        TimeZone::get(&self.time_zone).map_err(|source| ConfigError::UnknownTimeZone {
            name: self.time_zone.clone(),
            source,
        })
    }
}

/// Order list polling settings.
#[derive(Debug, Clone, Args)]
pub struct PollingConfig {
    /// Seconds between order list refreshes
    #[arg(long, env = "QUIRE_POLL_INTERVAL_SECS", default_value_t = 30)]
    pub poll_interval_secs: u64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Compact, human-readable logs.
    Compact,

    /// Structured JSON logs.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Args)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Log format (compact, json)
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

/// Everything the engine reads from flags and environment.
#[derive(Debug, Clone, Args)]
pub struct EngineConfig {
    #[command(flatten)]
    pub backend: BackendConfig,

    #[command(flatten)]
    pub polling: PollingConfig,

    #[command(flatten)]
    pub logging: LoggingConfig,
}
