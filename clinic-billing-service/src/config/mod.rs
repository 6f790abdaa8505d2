//! Configuration module for clinic-billing-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub analytics: AnalyticsConfig,
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Offset from UTC, in minutes, at which a sales day starts.
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub statement_timeout: Duration,
}

impl BillingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "clinic-billing-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            analytics: AnalyticsConfig {
                utc_offset_minutes: env::var("ANALYTICS_UTC_OFFSET_MINUTES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(480),
            },
            archive: ArchiveConfig {
                statement_timeout: Duration::from_secs(
                    env::var("ARCHIVE_STATEMENT_TIMEOUT_SECS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(30),
                ),
            },
        })
    }

    /// Configuration for tests and local runs that never touch a database.
    pub fn for_tests() -> Self {
        Self {
            common: core_config::Config::default(),
            service_name: "clinic-billing-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "debug".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 1,
                min_connections: 0,
            },
            analytics: AnalyticsConfig {
                utc_offset_minutes: 0,
            },
            archive: ArchiveConfig {
                statement_timeout: Duration::from_secs(30),
            },
        }
    }
}
