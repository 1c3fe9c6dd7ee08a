//! File and table storage configuration

use anyhow::Result;
use std::path::{Path, PathBuf};

use super::required;

/// Location of the flat JSON files
#[derive(Debug, Clone)]
pub struct JsonFileConfig {
    pub path: PathBuf,
    pub availability_path: PathBuf,
}

impl JsonFileConfig {
    /// The busy-date file lives next to the truck file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let availability_path = path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join("truck_availability.json");
        Self {
            path,
            availability_path,
        }
    }

    pub fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = get("TRUCKS_JSON_PATH").unwrap_or_else(|| "data/trucks.json".to_string());
        Ok(Self::new(path))
    }
}

/// Cloud table account settings
#[derive(Debug, Clone)]
pub struct TableStorageConfig {
    pub account_name: String,
    /// Base64 account key used to sign requests
    pub account_key: String,
    /// Base URL that table names are appended to
    pub endpoint: String,
    pub truck_table: String,
    pub availability_table: String,
    /// Plate number -> status partition, one row per truck
    pub index_table: String,
}

impl TableStorageConfig {
    pub fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let account_name = required(get, "TABLES_STORAGE_ACCOUNT_NAME")?;
        let account_key = required(get, "TABLES_PRIMARY_STORAGE_ACCOUNT_KEY")?;
        let endpoint = match get("TABLES_STORAGE_ENDPOINT") {
            Some(endpoint) if !endpoint.trim().is_empty() => {
                endpoint.trim_end_matches('/').to_string()
            }
            _ => {
                let suffix = get("TABLES_STORAGE_ENDPOINT_SUFFIX")
                    .unwrap_or_else(|| "core.windows.net".to_string());
                resolve_endpoint(&account_name, &suffix)
            }
        };

        Ok(Self {
            account_name,
            account_key,
            endpoint,
            truck_table: get("TABLES_TRUCK_TABLE").unwrap_or_else(|| "trucks".to_string()),
            availability_table: get("TABLES_AVAILABILITY_TABLE")
                .unwrap_or_else(|| "truckavailability".to_string()),
            index_table: get("TABLES_INDEX_TABLE").unwrap_or_else(|| "truckplates".to_string()),
        })
    }
}

/// Local emulators are addressed path-style over plain HTTP.
pub fn resolve_endpoint(account_name: &str, suffix: &str) -> String {
    if suffix.contains("localhost") || suffix.contains("127.0.0.1") {
        format!("http://{}/{}", suffix.trim_end_matches('/'), account_name)
    } else {
        format!("https://{}.table.{}", account_name, suffix)
    }
}
