//! Runtime configuration read from the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::store::memory::DEFAULT_LIST_LIMIT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

/// Service settings.
///
/// | Variable                 | Default     |
/// |--------------------------|-------------|
/// | `KVEDGE_HOST`            | `127.0.0.1` |
/// | `KVEDGE_PORT`            | `8787`      |
/// | `RATE_LIMIT_REQUESTS`    | `10`        |
/// | `RATE_LIMIT_PERIOD_SECS` | `60`        |
/// | `CACHE_TTL_SECS`         | `60`        |
/// | `KV_LIST_LIMIT`          | `1000`      |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub rate_limit_requests: u32,
    pub rate_limit_period_secs: u64,
    pub cache_ttl_secs: u64,
    pub kv_list_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8787,
            rate_limit_requests: 10,
            rate_limit_period_secs: 60,
            cache_ttl_secs: 60,
            kv_list_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl Config {
    /// Loads `.env` if present, then reads each variable, keeping the
    /// default for any that is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            host: lookup("KVEDGE_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "KVEDGE_PORT", defaults.port)?,
            rate_limit_requests: parse_var(
                &lookup,
                "RATE_LIMIT_REQUESTS",
                defaults.rate_limit_requests,
            )?,
            rate_limit_period_secs: parse_var(
                &lookup,
                "RATE_LIMIT_PERIOD_SECS",
                defaults.rate_limit_period_secs,
            )?,
            cache_ttl_secs: parse_var(&lookup, "CACHE_TTL_SECS", defaults.cache_ttl_secs)?,
            kv_list_limit: parse_var(&lookup, "KV_LIST_LIMIT", defaults.kv_list_limit)?,
        };

        if config.rate_limit_period_secs == 0 {
            return Err(ConfigError::Zero {
                name: "RATE_LIMIT_PERIOD_SECS",
            });
        }
        if config.kv_list_limit == 0 {
            return Err(ConfigError::Zero {
                name: "KV_LIST_LIMIT",
            });
        }
        Ok(config)
    }

    /// `host:port` for [`Server::bind`](crate::Server::bind).
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn rate_limit_period(&self) -> Duration {
        Duration::from_secs(self.rate_limit_period_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}
