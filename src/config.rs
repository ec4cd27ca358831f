//! Service configuration parsed from environment variables.
//!
//! Required:
//! - `DATABASE_URL`
//! - `JWT_SECRET`: HS256 secret shared with the login service
//!
//! Optional:
//! - `PORT`: default 3000
//! - `DB_MAX_CONNECTIONS`: default 5
//! - `PERSIST_TIMEOUT_MS`: bound on the close-time batch insert, default 5000
//! - `CLIENT_QUEUE_CAPACITY`: per-connection outbound queue, default 256

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_PERSIST_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} required")]
    Missing(&'static str),
    #[error("invalid {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub persist_timeout: Duration,
    pub client_queue_capacity: usize,
}

impl Config {
    /// # Errors
    ///
    /// `Missing` for an absent required variable, `Invalid` for an
    /// unparseable `PORT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;
        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value: raw.clone() })?,
            None => DEFAULT_PORT,
        };
        let persist_timeout_ms = parse_or(&lookup, "PERSIST_TIMEOUT_MS", DEFAULT_PERSIST_TIMEOUT_MS);

        Ok(Self {
            database_url,
            jwt_secret,
            port,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            persist_timeout: Duration::from_millis(persist_timeout_ms),
            client_queue_capacity: parse_or(&lookup, "CLIENT_QUEUE_CAPACITY", DEFAULT_CLIENT_QUEUE_CAPACITY).max(1),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
