//! Configuration module for inventory-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct InventoryConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
    pub admin: AdminConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Upper bound on one engine operation, transaction included.
    pub operation_timeout_ms: u64,
    /// Buffer of the in-process bulk completion channel.
    pub notification_channel_capacity: usize,
}

impl LedgerConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 5_000,
            notification_channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdminConfig {
    /// Token expected in `x-admin-token` for privileged actions. Unset
    /// disables them.
    pub token: Option<String>,
}

impl InventoryConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let ledger_defaults = LedgerConfig::default();

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "inventory-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: parse_or(env::var("DATABASE_MAX_CONNECTIONS").ok(), 10),
                min_connections: parse_or(env::var("DATABASE_MIN_CONNECTIONS").ok(), 2),
                acquire_timeout_secs: parse_or(env::var("DATABASE_ACQUIRE_TIMEOUT_SECS").ok(), 5),
            },
            ledger: LedgerConfig {
                operation_timeout_ms: parse_or(
                    env::var("LEDGER_OPERATION_TIMEOUT_MS").ok(),
                    ledger_defaults.operation_timeout_ms,
                ),
                notification_channel_capacity: parse_or(
                    env::var("NOTIFICATION_CHANNEL_CAPACITY").ok(),
                    ledger_defaults.notification_channel_capacity,
                ),
            },
            admin: AdminConfig {
                token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            },
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_values_use_default() {
        assert_eq!(parse_or::<u32>(None, 10), 10);
        assert_eq!(parse_or::<u32>(Some("abc".to_string()), 10), 10);
        assert_eq!(parse_or::<u32>(Some(" 25 ".to_string()), 10), 25);
    }

    #[test]
    fn ledger_defaults() {
        let ledger = LedgerConfig::default();
        assert_eq!(ledger.operation_timeout(), Duration::from_secs(5));
        assert_eq!(ledger.notification_channel_capacity, 256);
    }
}
