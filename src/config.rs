//! Configuration loaded from environment variables with defaults.
//!
//! A `.env` file in the working directory is honoured when present.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::order::TransitionPolicy;
use crate::utils::RetryConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// `None` runs the service on the in-memory store
    pub postgres: Option<PostgresConfig>,
    pub server: ServerConfig,
    pub policy: TransitionPolicy,
    pub read_retry: ReadRetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// `PostgreSQL` connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Pool acquire timeout in seconds
    pub connect_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port for `/metrics` and `/health`
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadRetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

impl ReadRetryConfig {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            ..RetryConfig::default()
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Missing or unparseable values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = TransitionPolicy::default();

        Self {
            postgres: lookup("DATABASE_URL")
                .filter(|url| !url.trim().is_empty())
                .map(|url| PostgresConfig {
                    url,
                    max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10),
                    connect_timeout: parse_or(&lookup, "DATABASE_CONNECT_TIMEOUT", 30),
                }),
            server: ServerConfig {
                metrics_port: parse_or(&lookup, "METRICS_PORT", 9090),
            },
            policy: TransitionPolicy {
                deliver_requires_courier: parse_or(
                    &lookup,
                    "ORDER_DELIVER_REQUIRES_COURIER",
                    defaults.deliver_requires_courier,
                ),
                cancel_after_payment: parse_or(
                    &lookup,
                    "ORDER_CANCEL_AFTER_PAYMENT",
                    defaults.cancel_after_payment,
                ),
            },
            read_retry: ReadRetryConfig {
                max_attempts: parse_or(&lookup, "READ_RETRY_ATTEMPTS", 3),
                initial_delay_ms: parse_or(&lookup, "READ_RETRY_INITIAL_DELAY_MS", 100),
            },
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);

        assert!(config.postgres.is_none());
        assert_eq!(config.server.metrics_port, 9090);
        assert_eq!(config.policy, TransitionPolicy::default());
        assert_eq!(config.read_retry.max_attempts, 3);
    }

    #[test]
    fn test_postgres_and_policy_overrides() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/orders"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("ORDER_DELIVER_REQUIRES_COURIER", "true"),
            ("ORDER_CANCEL_AFTER_PAYMENT", "false"),
        ]);

        let postgres = config.postgres.unwrap();
        assert_eq!(postgres.url, "postgres://localhost/orders");
        assert_eq!(postgres.max_connections, 4);
        assert_eq!(postgres.connect_timeout, 30);
        assert!(config.policy.deliver_requires_courier);
        assert!(!config.policy.cancel_after_payment);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = config_from(&[("METRICS_PORT", "not-a-port"), ("READ_RETRY_ATTEMPTS", "-1")]);

        assert_eq!(config.server.metrics_port, 9090);
        assert_eq!(config.read_retry.max_attempts, 3);
    }

    #[test]
    fn test_zero_retry_attempts_still_runs_once() {
        let config = config_from(&[("READ_RETRY_ATTEMPTS", "0")]);
        assert_eq!(config.read_retry.to_retry_config().max_attempts, 1);
    }

    #[test]
    fn test_blank_database_url_means_in_memory() {
        let config = config_from(&[("DATABASE_URL", "  ")]);
        assert!(config.postgres.is_none());
    }
}
