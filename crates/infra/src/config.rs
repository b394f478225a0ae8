//! Runtime configuration, read from environment variables.
//!
//! | variable                 | default          |
//! |--------------------------|------------------|
//! | `CAMPUS_BIND_ADDR`       | `0.0.0.0:8080`   |
//! | `CAMPUS_APP_NAME`        | `campusApp`      |
//! | `USE_PERSISTENT_STORES`  | `false`          |
//! | `DATABASE_URL`           | required when persistent |
//! | `SEARCH_URL`             | unset: in-memory index |
//! | `INDEX_MAX_ATTEMPTS`     | `8`              |
//! | `INDEX_BASE_DELAY_MS`    | `200`            |
//! | `INDEX_MAX_DELAY_MS`     | `30000`          |
//! | `INDEX_POLL_INTERVAL_MS` | `250`            |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::indexer::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Prefix of alert/error headers and alert message keys.
    pub app_name: String,
    pub persistent_stores: bool,
    pub database_url: Option<String>,
    pub search_url: Option<String>,
    pub retry_policy: RetryPolicy,
    pub poll_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            app_name: "campusApp".to_string(),
            persistent_stores: false,
            database_url: None,
            search_url: None,
            retry_policy: RetryPolicy::default(),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let retry_policy = RetryPolicy::exponential(
            parse(&get, "INDEX_MAX_ATTEMPTS")?.unwrap_or(defaults.retry_policy.max_attempts),
            millis(&get, "INDEX_BASE_DELAY_MS")?.unwrap_or(defaults.retry_policy.base_delay),
            millis(&get, "INDEX_MAX_DELAY_MS")?.unwrap_or(defaults.retry_policy.max_delay),
        );
        if retry_policy.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "INDEX_MAX_ATTEMPTS",
                value: "0".into(),
                reason: "at least one attempt is required".into(),
            });
        }

        let config = Self {
            bind_addr: parse(&get, "CAMPUS_BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            app_name: get("CAMPUS_APP_NAME").unwrap_or(defaults.app_name),
            persistent_stores: parse(&get, "USE_PERSISTENT_STORES")?.unwrap_or(false),
            database_url: get("DATABASE_URL"),
            search_url: get("SEARCH_URL"),
            retry_policy,
            poll_interval: millis(&get, "INDEX_POLL_INTERVAL_MS")?.unwrap_or(defaults.poll_interval),
        };

        if config.persistent_stores && config.database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        Ok(config)
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|value| {
            value.parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

fn millis(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(parse::<u64>(get, key)?.map(Duration::from_millis))
}
