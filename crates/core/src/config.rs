//! Environment-driven configuration for the pipeline services.
//!
//! Loaded once at worker startup via [`AppConfig::from_env`]. Only
//! `DATABASE_URL` is required; everything else has a sensible default.
//!
//! | Variable                    | Required | Default              |
//! |-----------------------------|----------|----------------------|
//! | `DATABASE_URL`              | yes      | —                    |
//! | `CACHE_URL`                 | no       | — (in-process state) |
//! | `CONSUMER_GROUP`            | no       | `vitalflow-pipeline` |
//! | `OFFSET_RESET`              | no       | `earliest`           |
//! | `PUSH_GATEWAY_URL`          | no       | —                    |
//! | `ALERT_RECIPIENT`           | no       | `care-team`          |
//! | `ALERT_TEMPLATE`            | no       | — (built-in body)    |
//! | `ALERT_THRESHOLD_PERCENT`   | no       | `20`                 |
//! | `WARNING_THRESHOLD_PERCENT` | no       | `10`                 |
//! | `WARNING_BOUNDARY_PERCENT`  | no       | `5`                  |
//! | `WARNING_TIMEOUT_MINUTES`   | no       | `10`                 |
//! | `ALERT_TIMEOUT_MINUTES`     | no       | `5`                  |

use std::str::FromStr;

use crate::error::CoreError;
use crate::thresholds::AnalysisSettings;

/// Configuration surface for the worker binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Postgres connection string for the alert/template/dead-letter store.
    pub database_url: String,
    /// Redis connection string for the shared escalation state store.
    /// `None` falls back to in-process state (single instance only).
    pub cache_url: Option<String>,
    /// Consumer group id shared by horizontally scaled instances.
    pub consumer_group: String,
    /// Where a new consumer group starts: `earliest` or `latest`.
    pub offset_reset: String,
    /// Push-gateway endpoint for the web push sender.
    pub push_gateway_url: Option<String>,
    /// Recipient for dispatched clinical notifications.
    pub alert_recipient: String,
    /// Template name to render notification bodies with, if any.
    pub alert_template: Option<String>,
    /// Analysis thresholds and escalation window timeouts.
    pub settings: AnalysisSettings,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, CoreError> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| CoreError::MissingConfig("DATABASE_URL"))?;

        let defaults = AnalysisSettings::default();
        let settings = AnalysisSettings {
            alert_threshold_percent: env_parse(
                "ALERT_THRESHOLD_PERCENT",
                defaults.alert_threshold_percent,
            )?,
            warning_threshold_percent: env_parse(
                "WARNING_THRESHOLD_PERCENT",
                defaults.warning_threshold_percent,
            )?,
            warning_boundary_percent: env_parse(
                "WARNING_BOUNDARY_PERCENT",
                defaults.warning_boundary_percent,
            )?,
            warning_timeout_minutes: env_parse(
                "WARNING_TIMEOUT_MINUTES",
                defaults.warning_timeout_minutes,
            )?,
            alert_timeout_minutes: env_parse(
                "ALERT_TIMEOUT_MINUTES",
                defaults.alert_timeout_minutes,
            )?,
        };

        Ok(Self {
            database_url,
            cache_url: std::env::var("CACHE_URL").ok(),
            consumer_group: std::env::var("CONSUMER_GROUP")
                .unwrap_or_else(|_| "vitalflow-pipeline".to_string()),
            offset_reset: std::env::var("OFFSET_RESET").unwrap_or_else(|_| "earliest".to_string()),
            push_gateway_url: std::env::var("PUSH_GATEWAY_URL").ok(),
            alert_recipient: std::env::var("ALERT_RECIPIENT")
                .unwrap_or_else(|_| "care-team".to_string()),
            alert_template: std::env::var("ALERT_TEMPLATE").ok(),
            settings,
        })
    }
}

/// Parse an optional env var, falling back to `default` when unset.
fn env_parse<T: FromStr>(key: &'static str, default: T) -> Result<T, CoreError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| CoreError::InvalidConfig { key, value: raw }),
        Err(_) => Ok(default),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
