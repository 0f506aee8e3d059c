//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::coordinator::IsolationLevel;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    pub log_format: LogFormat,

    /// Deadline for one transaction attempt, also used as lock_timeout
    pub transaction_timeout: Duration,

    /// Attempts made for a transaction that hits a serialization conflict
    pub transaction_max_attempts: u32,

    /// Isolation level for purchase transactions
    pub purchase_isolation: IsolationLevel,

    /// Apply embedded migrations on startup
    pub run_migrations: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = var("DATABASE_MAX_CONNECTIONS", "10")
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = var("HOST", "127.0.0.1");

        let port = var("PORT", "3000")
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = var("ENVIRONMENT", "development");

        let log_format = match var("LOG_FORMAT", "text").to_ascii_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            _ => return Err(ConfigError::InvalidValue("LOG_FORMAT")),
        };

        let timeout_ms: u64 = var("TRANSACTION_TIMEOUT_MS", "5000")
            .parse()
            .map_err(|_| ConfigError::InvalidValue("TRANSACTION_TIMEOUT_MS"))?;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("TRANSACTION_TIMEOUT_MS"));
        }

        let transaction_max_attempts: u32 = var("TRANSACTION_MAX_ATTEMPTS", "5")
            .parse()
            .map_err(|_| ConfigError::InvalidValue("TRANSACTION_MAX_ATTEMPTS"))?;
        if transaction_max_attempts == 0 {
            return Err(ConfigError::InvalidValue("TRANSACTION_MAX_ATTEMPTS"));
        }

        let purchase_isolation = var("PURCHASE_ISOLATION", "repeatable_read")
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PURCHASE_ISOLATION"))?;

        let run_migrations = match var("RUN_MIGRATIONS", "false").to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => return Err(ConfigError::InvalidValue("RUN_MIGRATIONS")),
        };

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            log_format,
            transaction_timeout: Duration::from_millis(timeout_ms),
            transaction_max_attempts,
            purchase_isolation,
            run_migrations,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
