//! Cache configuration and environment loading.

use crate::error::{Error, Result};
use std::str::FromStr;
use std::time::Duration;

/// Default lifetime of a local-tier entry.
pub const DEFAULT_LOCAL_TTL: Duration = Duration::from_secs(5 * 60);

/// Default sweep period for expired local-tier entries.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Base lifetime of string entries written to the distributed tier (120 hours).
pub const DEFAULT_STRING_TTL: Duration = Duration::from_secs(120 * 60 * 60);

/// Upper bound (exclusive) of the random jitter added to string TTLs.
pub const DEFAULT_TTL_JITTER: Duration = Duration::from_secs(1);

/// Default bound on a single distributed or database call.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(3);

/// Configuration shared by every tier of a [`crate::CacheService`].
#[derive(Clone, Debug, PartialEq)]
pub struct CacheConfig {
    /// Environment/tenant prefix prepended to every key.
    pub key_prefix: String,
    pub local_ttl: Duration,
    pub cleanup_interval: Duration,
    pub string_ttl: Duration,
    pub ttl_jitter: Duration,
    pub operation_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            key_prefix: String::new(),
            local_ttl: DEFAULT_LOCAL_TTL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            string_ttl: DEFAULT_STRING_TTL,
            ttl_jitter: DEFAULT_TTL_JITTER,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl CacheConfig {
    /// Build a configuration from environment variables, falling back to defaults.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `CACHE_KEY_PREFIX` | `key_prefix` |
    /// | `CACHE_LOCAL_TTL_SECS` | `local_ttl` |
    /// | `CACHE_CLEANUP_INTERVAL_SECS` | `cleanup_interval` |
    /// | `CACHE_STRING_TTL_SECS` | `string_ttl` |
    /// | `CACHE_TTL_JITTER_SECS` | `ttl_jitter` |
    /// | `CACHE_OPERATION_TIMEOUT_MS` | `operation_timeout` |
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if a variable is set but cannot be parsed,
    /// or if the resulting configuration fails [`CacheConfig::validate`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = CacheConfig::default();

        if let Some(prefix) = lookup("CACHE_KEY_PREFIX") {
            config.key_prefix = prefix;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "CACHE_LOCAL_TTL_SECS")? {
            config.local_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "CACHE_CLEANUP_INTERVAL_SECS")? {
            config.cleanup_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "CACHE_STRING_TTL_SECS")? {
            config.string_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "CACHE_TTL_JITTER_SECS")? {
            config.ttl_jitter = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "CACHE_OPERATION_TIMEOUT_MS")? {
            config.operation_timeout = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the tiers cannot run with.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` for a zero local TTL, string TTL, cleanup
    /// interval or timeout.
    pub fn validate(&self) -> Result<()> {
        if self.local_ttl.is_zero() {
            return Err(Error::ConfigError("local_ttl must be non-zero".to_string()));
        }
        if self.string_ttl.is_zero() {
            return Err(Error::ConfigError(
                "string_ttl must be non-zero".to_string(),
            ));
        }
        if self.cleanup_interval.is_zero() {
            return Err(Error::ConfigError(
                "cleanup_interval must be non-zero".to_string(),
            ));
        }
        if self.operation_timeout.is_zero() {
            return Err(Error::ConfigError(
                "operation_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the Redis-backed distributed tier.
#[derive(Clone, Debug, PartialEq)]
pub struct RedisConfig {
    pub url: String, // e.g. "redis://localhost:6379/0"
    pub pool_size: usize,
    pub connection_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            url: "redis://localhost:6379".to_string(),
            pool_size: 16,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisConfig {
    /// Read `REDIS_URL` and `REDIS_POOL_SIZE`, keeping defaults for anything unset.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if `REDIS_POOL_SIZE` is not a positive integer.
    pub fn from_env() -> Result<Self> {
        let lookup = |name: &str| std::env::var(name).ok();
        let mut config = RedisConfig::default();

        if let Some(url) = lookup("REDIS_URL") {
            config.url = url;
        }
        if let Some(size) = parse_var::<usize, _>(&lookup, "REDIS_POOL_SIZE")? {
            if size == 0 {
                return Err(Error::ConfigError(
                    "REDIS_POOL_SIZE must be greater than zero".to_string(),
                ));
            }
            config.pool_size = size;
        }
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::ConfigError(format!("{}={:?}: {}", name, raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.local_ttl, Duration::from_secs(300));
        assert_eq!(config.cleanup_interval, Duration::from_secs(600));
        assert_eq!(config.string_ttl, Duration::from_secs(432_000));
        assert!(config.key_prefix.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_config_from_lookup() {
        let config = CacheConfig::from_lookup(lookup_from(&[
            ("CACHE_KEY_PREFIX", "staging:"),
            ("CACHE_LOCAL_TTL_SECS", "30"),
            ("CACHE_OPERATION_TIMEOUT_MS", "250"),
        ]))
        .expect("valid config");

        assert_eq!(config.key_prefix, "staging:");
        assert_eq!(config.local_ttl, Duration::from_secs(30));
        assert_eq!(config.operation_timeout, Duration::from_millis(250));
        assert_eq!(config.cleanup_interval, DEFAULT_CLEANUP_INTERVAL);
    }

    #[test]
    fn test_cache_config_rejects_garbage() {
        let err = CacheConfig::from_lookup(lookup_from(&[("CACHE_LOCAL_TTL_SECS", "soon")]))
            .expect_err("should not parse");
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_cache_config_rejects_zero_ttl() {
        let err = CacheConfig::from_lookup(lookup_from(&[("CACHE_LOCAL_TTL_SECS", "0")]))
            .expect_err("zero ttl");
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_cache_config_rejects_zero_string_ttl() {
        let config = CacheConfig {
            string_ttl: Duration::ZERO,
            ttl_jitter: Duration::ZERO,
            ..CacheConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));

        let err = CacheConfig::from_lookup(lookup_from(&[("CACHE_STRING_TTL_SECS", "0")]))
            .expect_err("zero string ttl");
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_redis_config_default() {
        let config = RedisConfig::default();
        assert_eq!(config.url, "redis://localhost:6379");
        assert_eq!(config.pool_size, 16);
    }
}
