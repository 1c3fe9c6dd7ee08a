//! PostgreSQL configuration
//!
//! Connection settings for the relational backend. The URL comes from
//! `DATABASE_URL` or is assembled from the discrete `DB*` variables.

use anyhow::{anyhow, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use super::parse_or;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(3600),
        }
    }

    pub fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = match get("DATABASE_URL").filter(|url| !url.trim().is_empty()) {
            Some(url) => url,
            None => Self::compose_url(get)?,
        };

        let mut config = Self::new(url);
        config.max_connections = parse_or(get, "DB_MAX_CONNECTIONS", config.max_connections)?;
        config.min_connections = parse_or(get, "DB_MIN_CONNECTIONS", config.min_connections)?;
        config.connect_timeout =
            Duration::from_secs(parse_or(get, "DB_CONNECT_TIMEOUT_SECS", 30u64)?);
        Ok(config)
    }

    fn compose_url<F>(get: &F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = get("DBHOST").ok_or_else(|| anyhow!("DATABASE_URL or DBHOST must be set"))?;
        let name = get("DBNAME").unwrap_or_else(|| "truck".to_string());
        let user = get("DBUSER").unwrap_or_else(|| "postgres".to_string());
        let pass = get("DBPASS").unwrap_or_default();
        let sslmode = get("SSLMODE").unwrap_or_else(|| "prefer".to_string());

        Ok(format!(
            "postgresql://{}:{}@{}/{}?sslmode={}",
            urlencoding::encode(&user),
            urlencoding::encode(&pass),
            host,
            name,
            sslmode
        ))
    }

    /// Create the connection pool
    pub async fn create_pool(&self) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.connect_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
            .connect(&self.url)
            .await
    }

    /// URL with credentials hidden, for logs
    pub fn masked_url(&self) -> String {
        mask_database_url(&self.url)
    }
}

fn mask_database_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at_pos)) if at_pos > scheme_end => {
            format!("{}***:***@{}", &url[..scheme_end + 3], &url[at_pos + 1..])
        }
        _ => url.to_string(),
    }
}
