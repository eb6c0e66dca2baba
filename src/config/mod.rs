//! Configuration management
//!
//! This module handles loading and parsing configuration for the timeclock service.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Time-entry configuration
    #[serde(default)]
    pub time_entries: TimeEntryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/timeclock.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Days a generated PIN stays valid for login
    #[serde(default = "default_pin_lifespan_days")]
    pub pin_lifespan_days: i64,
    /// Days an issued bearer token stays valid
    #[serde(default = "default_token_lifespan_days")]
    pub token_lifespan_days: i64,
    /// Failed logins allowed per identifier inside the lockout window
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: usize,
    /// Lockout window in minutes
    #[serde(default = "default_lockout_minutes")]
    pub lockout_minutes: i64,
    /// Login requests allowed per client IP per minute
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: usize,
    /// Admin account created at startup when no admin exists yet
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Credentials for the first administrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            pin_lifespan_days: default_pin_lifespan_days(),
            token_lifespan_days: default_token_lifespan_days(),
            max_failed_attempts: default_max_failed_attempts(),
            lockout_minutes: default_lockout_minutes(),
            max_requests_per_minute: default_max_requests_per_minute(),
            bootstrap_admin: None,
        }
    }
}

fn default_pin_lifespan_days() -> i64 {
    7
}

fn default_token_lifespan_days() -> i64 {
    7
}

fn default_max_failed_attempts() -> usize {
    5
}

fn default_lockout_minutes() -> i64 {
    15
}

fn default_max_requests_per_minute() -> usize {
    10
}

/// Time-entry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntryConfig {
    /// How far back `get-sessions` looks, in days
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    /// Page size used when the request omits one
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    /// Upper bound for a requested page size
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for TimeEntryConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_window_days() -> i64 {
    30
}

fn default_page_size() -> u32 {
    10
}

fn default_max_page_size() -> u32 {
    100
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - TIMECLOCK_SERVER_HOST
    /// - TIMECLOCK_SERVER_PORT
    /// - TIMECLOCK_SERVER_CORS_ORIGIN
    /// - TIMECLOCK_DATABASE_DRIVER
    /// - TIMECLOCK_DATABASE_URL
    /// - TIMECLOCK_AUTH_PIN_LIFESPAN_DAYS
    /// - TIMECLOCK_AUTH_TOKEN_LIFESPAN_DAYS
    /// - TIMECLOCK_SESSIONS_WINDOW_DAYS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the services cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time_entries.window_days <= 0 {
            return Err(ConfigError::ValidationError(
                "time_entries.window_days must be positive".to_string(),
            ));
        }
        if self.time_entries.default_page_size == 0
            || self.time_entries.default_page_size > self.time_entries.max_page_size
        {
            return Err(ConfigError::ValidationError(
                "time_entries.default_page_size must be between 1 and max_page_size".to_string(),
            ));
        }
        if self.auth.pin_lifespan_days <= 0 || self.auth.token_lifespan_days <= 0 {
            return Err(ConfigError::ValidationError(
                "auth lifespans must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("TIMECLOCK_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("TIMECLOCK_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("TIMECLOCK_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(driver) = std::env::var("TIMECLOCK_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("TIMECLOCK_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(days) = std::env::var("TIMECLOCK_AUTH_PIN_LIFESPAN_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                self.auth.pin_lifespan_days = days;
            }
        }
        if let Ok(days) = std::env::var("TIMECLOCK_AUTH_TOKEN_LIFESPAN_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                self.auth.token_lifespan_days = days;
            }
        }

        if let (Ok(email), Ok(password)) = (
            std::env::var("TIMECLOCK_ADMIN_EMAIL"),
            std::env::var("TIMECLOCK_ADMIN_PASSWORD"),
        ) {
            self.auth.bootstrap_admin = Some(BootstrapAdmin {
                username: std::env::var("TIMECLOCK_ADMIN_USERNAME")
                    .unwrap_or_else(|_| "admin".to_string()),
                email,
                password,
            });
        }

        if let Ok(days) = std::env::var("TIMECLOCK_SESSIONS_WINDOW_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                self.time_entries.window_days = days;
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Config tests touching the process environment share this lock.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
