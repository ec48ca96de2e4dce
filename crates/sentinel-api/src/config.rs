//! Server configuration read from environment variables.

use std::str::FromStr;
use std::time::Duration;

use sentinel_outbox::policy::{RetryPolicy, UnknownTopicPolicy, WorkerConfig};
use sentinel_resilience::circuit_breaker::BreakerConfig;
use sentinel_resilience::executor::ExecutorConfig;
use thiserror::Error;

/// Invalid or missing configuration. Fails startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} environment variable must be set")]
    Missing(&'static str),

    /// A variable is set but cannot be used.
    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Rate limiting for guarded HTTP operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Calls allowed per caller per window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

/// Complete server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `PostgreSQL` connection string.
    pub database_url: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Breaker defaults.
    pub breaker: BreakerConfig,
    /// Executor defaults.
    pub executor: ExecutorConfig,
    /// Per-caller rate limit.
    pub rate_limit: RateLimitConfig,
    /// Event worker settings.
    pub worker: WorkerConfig,
    /// When set, an in-process poller runs a batch at this interval.
    pub poll_interval: Option<Duration>,
}

impl Config {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for a missing `DATABASE_URL` or any unparsable
    /// value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup: &lookup };

        let database_url = env.raw("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let defaults = WorkerConfig::default();
        let retry_defaults = RetryPolicy::default();

        let breaker = BreakerConfig {
            threshold: env.parse("BREAKER_THRESHOLD", BreakerConfig::default().threshold)?,
            cooldown: env.millis("BREAKER_COOLDOWN_MS", BreakerConfig::default().cooldown)?,
        };
        if breaker.threshold == 0 {
            return Err(invalid("BREAKER_THRESHOLD", "0", "must be at least 1"));
        }

        let executor = ExecutorConfig {
            default_timeout: env.millis(
                "OPERATION_TIMEOUT_MS",
                ExecutorConfig::default().default_timeout,
            )?,
        };

        let rate_limit = RateLimitConfig {
            max_requests: env.parse("RATE_LIMIT_MAX_REQUESTS", 100)?,
            window: env.millis("RATE_LIMIT_WINDOW_MS", Duration::from_secs(60))?,
        };

        let worker = WorkerConfig {
            batch_limit: env.parse("WORKER_BATCH_LIMIT", defaults.batch_limit)?,
            retry: RetryPolicy {
                max_attempts: env.parse("WORKER_MAX_ATTEMPTS", retry_defaults.max_attempts)?,
                base_backoff: env.millis("WORKER_BACKOFF_BASE_MS", retry_defaults.base_backoff)?,
                max_backoff: env.millis("WORKER_BACKOFF_MAX_MS", retry_defaults.max_backoff)?,
            },
            unknown_topic: env.parse("WORKER_UNKNOWN_TOPIC", UnknownTopicPolicy::default())?,
            lease: env.millis("WORKER_LEASE_MS", defaults.lease)?,
            handler_timeout: defaults.handler_timeout,
        };
        let worker = WorkerConfig {
            // Handlers must finish inside their lease.
            handler_timeout: worker.handler_timeout.min(worker.lease / 2),
            ..worker
        };
        if worker.batch_limit == 0 {
            return Err(invalid("WORKER_BATCH_LIMIT", "0", "must be at least 1"));
        }
        if worker.retry.max_attempts == 0 {
            return Err(invalid("WORKER_MAX_ATTEMPTS", "0", "must be at least 1"));
        }

        let poll_interval = match env.raw("WORKER_POLL_INTERVAL_MS") {
            Some(_) => Some(env.millis("WORKER_POLL_INTERVAL_MS", Duration::ZERO)?),
            None => None,
        }
        .filter(|interval| !interval.is_zero());

        Ok(Self {
            database_url,
            host: env.raw("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: env.parse("PORT", 3000)?,
            breaker,
            executor,
            rate_limit,
            worker,
            poll_interval,
        })
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_owned(),
        reason: reason.to_owned(),
    }
}

struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|e: T::Err| invalid(key, &value, &e.to_string())),
            None => Ok(default),
        }
    }

    fn millis(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parse(key, default_ms).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_when_only_database_url_is_set() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/sentinel")]).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.breaker.threshold, 5);
        assert_eq!(config.breaker.cooldown, Duration::from_secs(30));
        assert_eq!(config.executor.default_timeout, Duration::from_secs(15));
        assert_eq!(config.worker.batch_limit, 10);
        assert_eq!(config.worker.retry.max_attempts, 3);
        assert_eq!(config.worker.retry.backoff_for(1), Duration::ZERO);
        assert_eq!(config.worker.unknown_topic, UnknownTopicPolicy::Complete);
        assert!(config.worker.handler_timeout < config.worker.lease);
        assert!(config.poll_interval.is_none());
    }

    #[test]
    fn test_missing_database_url_fails() {
        assert_eq!(
            config_from(&[]).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://db/sentinel"),
            ("PORT", "8080"),
            ("BREAKER_THRESHOLD", "2"),
            ("BREAKER_COOLDOWN_MS", "1500"),
            ("WORKER_UNKNOWN_TOPIC", "skip"),
            ("WORKER_BACKOFF_BASE_MS", "2000"),
            ("WORKER_BACKOFF_MAX_MS", "5000"),
            ("WORKER_LEASE_MS", "10000"),
            ("WORKER_POLL_INTERVAL_MS", "2500"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.breaker.threshold, 2);
        assert_eq!(config.breaker.cooldown, Duration::from_millis(1500));
        assert_eq!(config.worker.unknown_topic, UnknownTopicPolicy::Skip);
        assert_eq!(config.worker.retry.backoff_for(1), Duration::from_secs(2));
        assert_eq!(config.worker.retry.backoff_for(3), Duration::from_secs(5));
        assert_eq!(config.worker.handler_timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_invalid_values_fail_startup() {
        let err = config_from(&[("DATABASE_URL", "postgres://db"), ("PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));

        let err = config_from(&[
            ("DATABASE_URL", "postgres://db"),
            ("WORKER_UNKNOWN_TOPIC", "ignore"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "WORKER_UNKNOWN_TOPIC",
                ..
            }
        ));

        let err = config_from(&[("DATABASE_URL", "postgres://db"), ("BREAKER_THRESHOLD", "0")])
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "BREAKER_THRESHOLD",
                ..
            }
        ));
    }
}
