//! Environment configuration
//!
//! Server settings and the choice of persistence backend.

use anyhow::{bail, Result};
use std::env;
use std::time::Duration;

use super::{parse_or, DatabaseConfig, JsonFileConfig, TableStorageConfig};

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Empty means any origin is accepted
    pub cors_origins: Vec<String>,
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3006,
            cors_origins: Vec::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or(get, "PORT", defaults.port)?,
            cors_origins: get("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            request_timeout: Duration::from_secs(parse_or(get, "REQUEST_TIMEOUT_SECS", 30u64)?),
        })
    }

    /// Bind address
    pub fn server_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Persistence backend, with the settings it needs
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Postgres(DatabaseConfig),
    JsonFile(JsonFileConfig),
    Table(TableStorageConfig),
}

impl BackendConfig {
    pub fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let kind = get("STORE_BACKEND").unwrap_or_else(|| "postgres".to_string());
        match kind.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "sql" => {
                Ok(BackendConfig::Postgres(DatabaseConfig::from_lookup(get)?))
            }
            "json" | "file" => Ok(BackendConfig::JsonFile(JsonFileConfig::from_lookup(get)?)),
            "table" | "azure_table" => {
                Ok(BackendConfig::Table(TableStorageConfig::from_lookup(get)?))
            }
            other => bail!(
                "STORE_BACKEND must be one of postgres, json, table; got '{}'",
                other
            ),
        }
    }
}

/// Full service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
}

impl AppConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|key: &str| env::var(key).ok())
    }

    pub fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            server: ServerConfig::from_lookup(get)?,
            backend: BackendConfig::from_lookup(get)?,
        })
    }
}
