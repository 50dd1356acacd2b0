use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

use crate::retry::RetryPolicy;

/// Access tokens live for a week unless overridden.
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60 * 24 * 7;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub statement_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(self.max_retries)
            .with_initial_delay(self.initial_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub retry: RetryConfig,
    pub static_dir: Option<PathBuf>,
}

/// Parse `key` if it is set; a value that does not parse is an error, not the default.
fn number_or<T, F>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a number in range, got {raw:?}")),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = DatabaseConfig {
            url: lookup("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: number_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            acquire_timeout_secs: number_or(&lookup, "DATABASE_ACQUIRE_TIMEOUT_SECS", 5)?,
            statement_timeout_ms: number_or(&lookup, "DATABASE_STATEMENT_TIMEOUT_MS", 5000)?,
        };
        let jwt = JwtConfig {
            secret: lookup("AUTHORIZATION_SECRET").context("AUTHORIZATION_SECRET must be set")?,
            ttl_minutes: number_or(&lookup, "ACCESS_TOKEN_TTL_MINUTES", DEFAULT_TOKEN_TTL_MINUTES)?,
        };
        let retry = RetryConfig {
            max_retries: number_or(&lookup, "STORE_RETRY_MAX", 3)?,
            initial_delay_ms: number_or(&lookup, "STORE_RETRY_INITIAL_DELAY_MS", 50)?,
        };
        let port = lookup("APP_PORT")
            .or_else(|| lookup("PORT"))
            .map(|v| v.parse::<u16>())
            .transpose()
            .context("APP_PORT must be a port number")?
            .unwrap_or(3000);

        Ok(Self {
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            database,
            jwt,
            retry,
            static_dir: lookup("STATIC_DIR").map(PathBuf::from),
        })
    }
}
