//! Configuration management for citifit
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Nothing here is global: the resulting [`Config`]
//! is passed explicitly into the source client, the sinks and the coordinator.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bike-share site scraping configuration
    pub source: SourceConfig,

    /// Directions service configuration
    pub directions: DirectionsConfig,

    /// Fitbit API configuration
    pub fitbit: FitbitConfig,

    /// Google Fit API configuration
    pub google_fit: GoogleFitConfig,

    /// Synchronization pacing
    pub sync: SyncConfig,

    /// Account store configuration
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// How the login page hands out its anti-forgery token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenStrategy {
    /// Hidden `<input>` on the login form
    HiddenField { name: String },
    /// Cookie set when the login page is served
    Cookie { name: String },
}

impl TokenStrategy {
    /// Field or cookie name the token is read from
    pub fn name(&self) -> &str {
        match self {
            Self::HiddenField { name } | Self::Cookie { name } => name,
        }
    }

    /// Form field under which the token is submitted with the credentials
    pub fn form_field(&self) -> &str {
        match self {
            Self::HiddenField { name } => name,
            Self::Cookie { .. } => DEFAULT_TOKEN_FIELD,
        }
    }
}

const DEFAULT_TOKEN_FIELD: &str = "_login_csrf_security_token";

impl Default for TokenStrategy {
    fn default() -> Self {
        Self::HiddenField {
            name: DEFAULT_TOKEN_FIELD.to_string(),
        }
    }
}

/// Bike-share site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Member site root, e.g. `https://member.citibikenyc.com`
    pub base_url: String,

    pub login_path: String,

    pub login_check_path: String,

    pub profile_path: String,

    /// Trip history prefix; the member id is appended
    pub trips_path: String,

    /// Absolute URL of the JSON station feed
    pub stations_url: String,

    pub token_strategy: TokenStrategy,

    /// IANA timezone the site renders trip times in
    pub timezone: String,

    /// Attempts per network step
    pub max_attempts: u32,

    /// Backoff base; the delay after attempt `n` is `base * 2^n`
    pub backoff_base_ms: u64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Requests per second
    pub rate_limit: u32,

    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://member.citibikenyc.com"),
            login_path: String::from("/profile/login"),
            login_check_path: String::from("/profile/login_check"),
            profile_path: String::from("/profile/"),
            trips_path: String::from("/profile/trips/"),
            stations_url: String::from("http://www.citibikenyc.com/stations/json"),
            token_strategy: TokenStrategy::default(),
            timezone: String::from("America/New_York"),
            max_attempts: 5,
            backoff_base_ms: 1000,
            request_timeout_secs: 30,
            rate_limit: 2,
            user_agent: format!("citifit/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl SourceConfig {
    /// Retry policy for every network step of the source client
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::with_delays(self.max_attempts, self.backoff_base_ms)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse the configured timezone
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {e}", self.timezone))
    }
}

/// Directions service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionsConfig {
    pub endpoint: String,
    pub api_key: String,
}

impl Default for DirectionsConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("https://maps.googleapis.com/maps/api/directions/json"),
            api_key: String::new(),
        }
    }
}

/// Fitbit API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitbitConfig {
    pub api_base: String,
}

impl Default for FitbitConfig {
    fn default() -> Self {
        Self {
            api_base: String::from("https://api.fitbit.com/1"),
        }
    }
}

/// Google Fit API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleFitConfig {
    pub api_base: String,

    /// Name of the derived distance stream created for imported rides
    pub data_stream_name: String,
}

impl Default for GoogleFitConfig {
    fn default() -> Self {
        Self {
            api_base: String::from("https://www.googleapis.com/fitness/v1"),
            data_stream_name: String::from("citifit-distance"),
        }
    }
}

/// Synchronization pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Pause between successive trip submissions
    pub submission_delay_ms: u64,

    /// Interval between fan-out triggers in daemon mode
    pub trigger_interval_secs: u64,

    /// Age after which an account lock left by a dead process is taken over
    pub lock_lease_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            submission_delay_ms: 1000,
            trigger_interval_secs: 900,
            lock_lease_secs: 6 * 3600,
        }
    }
}

impl SyncConfig {
    pub fn submission_delay(&self) -> Duration {
        Duration::from_millis(self.submission_delay_ms)
    }

    pub fn trigger_interval(&self) -> Duration {
        Duration::from_secs(self.trigger_interval_secs)
    }

    pub fn lock_lease(&self) -> Duration {
        Duration::from_secs(self.lock_lease_secs)
    }
}

/// Account store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/citifit.db"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let token_strategy = match std::env::var("CITIFIT_TOKEN_COOKIE") {
            Ok(name) if !name.is_empty() => TokenStrategy::Cookie { name },
            _ => TokenStrategy::HiddenField {
                name: env_or(
                    "CITIFIT_TOKEN_FIELD",
                    String::from(DEFAULT_TOKEN_FIELD),
                ),
            },
        };

        let config = Self {
            source: SourceConfig {
                base_url: env_or("CITIFIT_SOURCE_URL", defaults.source.base_url),
                stations_url: env_or("CITIFIT_STATIONS_URL", defaults.source.stations_url),
                token_strategy,
                timezone: env_or("CITIFIT_TIMEZONE", defaults.source.timezone),
                max_attempts: env_or("CITIFIT_MAX_ATTEMPTS", defaults.source.max_attempts),
                backoff_base_ms: env_or("CITIFIT_BACKOFF_BASE_MS", defaults.source.backoff_base_ms),
                request_timeout_secs: env_or(
                    "CITIFIT_REQUEST_TIMEOUT",
                    defaults.source.request_timeout_secs,
                ),
                rate_limit: env_or("CITIFIT_RATE_LIMIT", defaults.source.rate_limit),
                ..defaults.source
            },
            directions: DirectionsConfig {
                endpoint: env_or("CITIFIT_DIRECTIONS_URL", defaults.directions.endpoint),
                api_key: env_or("CITIFIT_DIRECTIONS_API_KEY", defaults.directions.api_key),
            },
            fitbit: FitbitConfig {
                api_base: env_or("CITIFIT_FITBIT_API", defaults.fitbit.api_base),
            },
            google_fit: GoogleFitConfig {
                api_base: env_or("CITIFIT_GOOGLE_FIT_API", defaults.google_fit.api_base),
                ..defaults.google_fit
            },
            sync: SyncConfig {
                submission_delay_ms: env_or(
                    "CITIFIT_SUBMISSION_DELAY_MS",
                    defaults.sync.submission_delay_ms,
                ),
                trigger_interval_secs: env_or(
                    "CITIFIT_TRIGGER_INTERVAL",
                    defaults.sync.trigger_interval_secs,
                ),
                lock_lease_secs: env_or("CITIFIT_LOCK_LEASE", defaults.sync.lock_lease_secs),
            },
            database: DatabaseConfig {
                sqlite_path: env_or("CITIFIT_SQLITE_PATH", defaults.database.sqlite_path),
            },
            logging: LoggingConfig {
                level: env_or("CITIFIT_LOG_LEVEL", defaults.logging.level),
                format: env_or("CITIFIT_LOG_FORMAT", defaults.logging.format),
            },
        };

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.source.max_attempts == 0 {
            anyhow::bail!("source.max_attempts must be greater than 0");
        }

        if self.source.rate_limit == 0 {
            anyhow::bail!("source.rate_limit must be greater than 0");
        }

        url::Url::parse(&self.source.base_url).context("source.base_url is not a valid URL")?;
        url::Url::parse(&self.source.stations_url)
            .context("source.stations_url is not a valid URL")?;

        self.source.tz()?;

        if self.source.token_strategy.name().is_empty() {
            anyhow::bail!("source.token_strategy name cannot be empty");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!(
                "logging.format must be 'text' or 'json', got '{}'",
                self.logging.format
            );
        }

        if self.sync.trigger_interval_secs == 0 {
            anyhow::bail!("sync.trigger_interval_secs must be greater than 0");
        }

        if self.sync.lock_lease_secs == 0 {
            anyhow::bail!("sync.lock_lease_secs must be greater than 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = Config::default();
        config.source.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
        config.logging.format = "json".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_timezone_rejected() {
        let mut config = Config::default();
        config.source.timezone = "Mars/Olympus_Mons".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_from_source() {
        let config = Config::default();
        let retry = config.source.retry();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.delay_after(3), Duration::from_secs(8));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            [source]
            base_url = "http://localhost:8080"

            [source.token_strategy]
            kind = "cookie"
            name = "csrf"

            [sync]
            submission_delay_ms = 0
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.source.base_url, "http://localhost:8080");
        assert_eq!(config.source.login_path, "/profile/login");
        assert_eq!(
            config.source.token_strategy,
            TokenStrategy::Cookie {
                name: "csrf".to_string()
            }
        );
        assert_eq!(config.sync.submission_delay_ms, 0);
        assert_eq!(config.sync.trigger_interval_secs, 900);
    }

    #[test]
    fn test_token_form_field() {
        assert_eq!(
            TokenStrategy::default().form_field(),
            "_login_csrf_security_token"
        );
        let cookie = TokenStrategy::Cookie {
            name: "XSRF-TOKEN".to_string(),
        };
        assert_eq!(cookie.form_field(), "_login_csrf_security_token");
    }
}
