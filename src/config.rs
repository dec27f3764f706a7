//! Environment-driven configuration, following the `Config::from_env` convention: load a
//! `.env` file if present, read each variable with a typed default, fail fast only on values
//! that have no sensible default.

use std::collections::HashMap;
use std::env;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct PathTtlRule {
    pub glob: String,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub origin_url: String,
    pub cache_default_ttl: u64,
    pub l1_cache_maxsize: u64,
    pub cache_skip_paths: Vec<String>,
    pub ttl_by_content_type: HashMap<String, u64>,
    pub ttl_by_path_pattern: Vec<PathTtlRule>,
    pub ttl_by_status_code: HashMap<u16, u64>,
    pub stale_ttl_offset: u64,
    pub lock_lease_seconds: u64,
    pub loser_max_wait_ms: u64,
    pub cache_key_include_query: bool,
    pub far_tier_timeout_ms: u64,
    pub origin_timeout_ms: u64,
    pub far_tier_pool_size: u32,
    pub refresh_mark_ttl_seconds: u64,
    pub scheduler_queue_capacity: usize,
    pub bind_addr: String,
    pub log_filter: String,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_json<T: serde::de::DeserializeOwned>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or(default),
        Err(_) => default,
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if a required variable is absent, or
    /// `ConfigError::Invalid` if a value fails to parse into its expected shape.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let ttl_by_status_code_raw: HashMap<String, u64> = env_json(
            "TTL_BY_STATUS_CODE",
            HashMap::from([("200".to_string(), 5), ("404".to_string(), 10)]),
        );
        let ttl_by_status_code = ttl_by_status_code_raw
            .into_iter()
            .map(|(status, ttl)| {
                status
                    .parse::<u16>()
                    .map(|status| (status, ttl))
                    .map_err(|_| ConfigError::Invalid {
                        name: "TTL_BY_STATUS_CODE",
                        reason: format!("'{status}' is not a valid status code"),
                    })
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        let ttl_by_path_pattern = env_json::<Vec<(String, u64)>>(
            "TTL_BY_PATH_PATTERN",
            vec![("/static/*".to_string(), 600)],
        )
        .into_iter()
        .map(|(glob, ttl_seconds)| PathTtlRule { glob, ttl_seconds })
        .collect();

        Ok(Self {
            redis_url: env_string("REDIS_URL", "redis://localhost:6379"),
            origin_url: env_string("ORIGIN_URL", "http://localhost:8080"),
            cache_default_ttl: env_or("CACHE_DEFAULT_TTL", 30),
            l1_cache_maxsize: env_or("L1_CACHE_MAXSIZE", 1000),
            cache_skip_paths: env_json(
                "CACHE_SKIP_PATHS",
                vec!["/health".to_string(), "/favicon.ico".to_string()],
            ),
            ttl_by_content_type: env_json(
                "TTL_BY_CONTENT_TYPE",
                HashMap::from([("application/json".to_string(), 30)]),
            ),
            ttl_by_path_pattern,
            ttl_by_status_code,
            stale_ttl_offset: env_or("STALE_TTL_OFFSET", 60),
            lock_lease_seconds: env_or("LOCK_LEASE_SECONDS", 10),
            loser_max_wait_ms: env_or("LOSER_MAX_WAIT_MS", 500),
            cache_key_include_query: env_or("CACHE_KEY_INCLUDE_QUERY", false),
            far_tier_timeout_ms: env_or("FAR_TIER_TIMEOUT_MS", 50),
            origin_timeout_ms: env_or("ORIGIN_TIMEOUT_MS", 2000),
            far_tier_pool_size: env_or("FAR_TIER_POOL_SIZE", 20),
            refresh_mark_ttl_seconds: env_or("REFRESH_MARK_TTL_SECONDS", 5),
            scheduler_queue_capacity: env_or("SCHEDULER_QUEUE_CAPACITY", 256),
            bind_addr: env_string("BIND_ADDR", "0.0.0.0:8088"),
            log_filter: env_string("LOG_FILTER", "info,cache_proxy=debug"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_is_absent() {
        for var in [
            "REDIS_URL",
            "ORIGIN_URL",
            "CACHE_DEFAULT_TTL",
            "TTL_BY_STATUS_CODE",
        ] {
            env::remove_var(var);
        }
        let config = Config::from_env().expect("defaults must be sufficient");
        assert_eq!(config.redis_url, "redis://localhost:6379");
        assert_eq!(config.cache_default_ttl, 30);
        assert_eq!(config.ttl_by_status_code.get(&200), Some(&5));
    }
}
