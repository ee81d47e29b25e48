//! Configuration module for franchise-ledger.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

use crate::services::LedgerPolicy;

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub policy: LedgerPolicy,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Upper bound on waiting for an entity row lock. `None` waits forever.
    pub lock_timeout_ms: Option<u64>,
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let defaults = LedgerPolicy::default();

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "franchise-ledger".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS").unwrap_or(10),
                min_connections: parse_var("DATABASE_MIN_CONNECTIONS").unwrap_or(2),
                lock_timeout_ms: parse_var("LEDGER_LOCK_TIMEOUT_MS").filter(|ms| *ms > 0),
            },
            policy: LedgerPolicy {
                max_observation_len: parse_var("LEDGER_MAX_OBSERVATION_LEN")
                    .unwrap_or(defaults.max_observation_len),
                ..defaults
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_ignores_garbage() {
        env::set_var("FRANCHISE_LEDGER_TEST_NUMBER", "not-a-number");
        assert_eq!(parse_var::<u32>("FRANCHISE_LEDGER_TEST_NUMBER"), None);
        env::set_var("FRANCHISE_LEDGER_TEST_NUMBER", "25");
        assert_eq!(parse_var::<u32>("FRANCHISE_LEDGER_TEST_NUMBER"), Some(25));
        env::remove_var("FRANCHISE_LEDGER_TEST_NUMBER");
    }
}
