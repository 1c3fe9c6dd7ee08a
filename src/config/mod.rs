//! Service configuration
//!
//! Everything is read once at process start and handed to the repositories
//! as explicit structs. Parsing goes through a lookup closure so tests can
//! feed values without touching the process environment.

pub mod database;
pub mod environment;
pub mod storage;

pub use database::DatabaseConfig;
pub use environment::{AppConfig, BackendConfig, ServerConfig};
pub use storage::{JsonFileConfig, TableStorageConfig};

use anyhow::{anyhow, Context, Result};
use std::str::FromStr;

/// Fetch a variable that has no sensible default
pub(crate) fn required<F>(get: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("{} must be set", key))
}

/// Fetch and parse a variable, falling back to `default` when unset
pub(crate) fn parse_or<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid value, got '{}'", key, raw)),
        _ => Ok(default),
    }
}
