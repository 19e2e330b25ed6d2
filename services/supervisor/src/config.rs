//! Configuration for the supervisor.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::Serialize;

use crate::pool::{BackoffPolicy, RestartPolicy};
use crate::store::{into_block, ConfigBlock};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Compact,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => bail!("unknown log format '{}', expected 'json' or 'compact'", other),
        }
    }
}

/// Supervisor configuration.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Workers per node when the node's config has no `cores` key.
    pub default_pool_size: usize,

    /// Crash restart behavior.
    pub restart: RestartPolicy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            default_pool_size: 1,
            restart: RestartPolicy::default(),
        }
    }
}

impl SupervisorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.parse::<u64>().ok());
        let flag = |key: &str| {
            lookup(key)
                .map(|s| matches!(s.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };

        let log_level = lookup("BLITZ_LOG_LEVEL").unwrap_or(defaults.log_level);

        let log_format = match lookup("BLITZ_LOG_FORMAT") {
            Some(s) => s.parse()?,
            None => defaults.log_format,
        };

        let default_pool_size = parsed("BLITZ_POOL_SIZE")
            .filter(|n| *n > 0)
            .map(|n| n as usize)
            .unwrap_or(defaults.default_pool_size);

        let max_restarts = match lookup("BLITZ_MAX_RESTARTS").as_deref() {
            Some("unbounded") => None,
            Some(s) => match s.parse::<u32>() {
                Ok(n) => Some(n),
                Err(_) => bail!("BLITZ_MAX_RESTARTS must be a number or 'unbounded', got '{}'", s),
            },
            None => defaults.restart.max_restarts,
        };

        let window = parsed("BLITZ_RESTART_WINDOW_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.restart.window);

        let backoff = BackoffPolicy {
            base: parsed("BLITZ_BACKOFF_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.restart.backoff.base),
            max: parsed("BLITZ_BACKOFF_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.restart.backoff.max),
            jitter: defaults.restart.backoff.jitter,
        };

        Ok(Self {
            log_level,
            log_format,
            default_pool_size,
            restart: RestartPolicy {
                max_restarts,
                window,
                backoff,
                hydrate_on_restart: flag("BLITZ_HYDRATE_ON_RESTART"),
                mark_worker_on_restart: flag("BLITZ_MARK_WORKER_ON_RESTART"),
            },
        })
    }

    /// The config as a block, used as the defaults of the `local` entry.
    pub fn to_block(&self) -> ConfigBlock {
        serde_json::to_value(self)
            .ok()
            .and_then(into_block)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = SupervisorConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.default_pool_size, 1);
        assert_eq!(config.restart.max_restarts, Some(5));
        assert!(!config.restart.hydrate_on_restart);
        assert!(!config.restart.mark_worker_on_restart);
    }

    #[test]
    fn test_overrides_from_env() {
        let config = SupervisorConfig::from_lookup(lookup(&[
            ("BLITZ_LOG_FORMAT", "compact"),
            ("BLITZ_POOL_SIZE", "3"),
            ("BLITZ_MAX_RESTARTS", "unbounded"),
            ("BLITZ_BACKOFF_BASE_MS", "0"),
            ("BLITZ_HYDRATE_ON_RESTART", "true"),
        ]))
        .unwrap();

        assert_eq!(config.log_format, LogFormat::Compact);
        assert_eq!(config.default_pool_size, 3);
        assert_eq!(config.restart.max_restarts, None);
        assert_eq!(config.restart.backoff.base, Duration::ZERO);
        assert!(config.restart.hydrate_on_restart);
    }

    #[test]
    fn test_zero_pool_size_falls_back() {
        let config = SupervisorConfig::from_lookup(lookup(&[("BLITZ_POOL_SIZE", "0")])).unwrap();
        assert_eq!(config.default_pool_size, 1);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(SupervisorConfig::from_lookup(lookup(&[("BLITZ_LOG_FORMAT", "xml")])).is_err());
        assert!(SupervisorConfig::from_lookup(lookup(&[("BLITZ_MAX_RESTARTS", "lots")])).is_err());
    }

    #[test]
    fn test_to_block_exposes_fields() {
        let block = SupervisorConfig::default().to_block();
        assert_eq!(block["default_pool_size"], serde_json::json!(1));
        assert_eq!(block["log_format"], serde_json::json!("json"));
        assert!(block["restart"].is_object());
    }
}
