//! Cloud table HTTP client
//!
//! Minimal client for the Azure Table Storage REST API: just the table and
//! entity calls the truck repository needs. Requests are signed with the
//! SharedKeyLite scheme.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use crate::config::TableStorageConfig;

type HmacSha256 = Hmac<Sha256>;

const API_VERSION: &str = "2019-02-02";
const ODATA_ACCEPT: &str = "application/json;odata=nometadata";
const NEXT_PARTITION_HEADER: &str = "x-ms-continuation-NextPartitionKey";
const NEXT_ROW_HEADER: &str = "x-ms-continuation-NextRowKey";

#[derive(Error, Debug)]
pub enum TableError {
    #[error("entity or table not found")]
    NotFound,

    #[error("entity or table already exists")]
    Conflict,

    #[error("table service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid account key: {0}")]
    InvalidKey(String),

    #[error("invalid request url: {0}")]
    InvalidUrl(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct QueryPage<T> {
    value: Vec<T>,
}

/// Signed client bound to one storage account
#[derive(Clone)]
pub struct TableClient {
    http: Client,
    account_name: String,
    key: Vec<u8>,
    endpoint: String,
}

impl TableClient {
    pub fn new(config: &TableStorageConfig) -> Result<Self, TableError> {
        let key = BASE64
            .decode(config.account_key.trim())
            .map_err(|e| TableError::InvalidKey(e.to_string()))?;

        Ok(Self {
            http: Client::new(),
            account_name: config.account_name.clone(),
            key,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Create `table`; an existing table is not an error
    pub async fn create_table(&self, table: &str) -> Result<(), TableError> {
        let request = self
            .request(Method::POST, "/Tables")?
            .header("Prefer", "return-no-content")
            .json(&json!({ "TableName": table }));

        match check(request.send().await?).await {
            Ok(_) | Err(TableError::Conflict) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Insert a new entity; `Conflict` if the key pair is taken
    pub async fn insert_entity<E: Serialize>(&self, table: &str, entity: &E) -> Result<(), TableError> {
        let request = self
            .request(Method::POST, &format!("/{}", table))?
            .header("Prefer", "return-no-content")
            .json(entity);

        check(request.send().await?).await.map(|_| ())
    }

    /// Point lookup; `None` when the entity does not exist
    pub async fn get_entity<E: DeserializeOwned>(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<E>, TableError> {
        let request = self.request(Method::GET, &entity_path(table, partition_key, row_key))?;

        match check(request.send().await?).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(TableError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace an existing entity; `NotFound` if it is missing
    pub async fn replace_entity<E: Serialize>(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        entity: &E,
    ) -> Result<(), TableError> {
        let request = self
            .request(Method::PUT, &entity_path(table, partition_key, row_key))?
            .header("If-Match", "*")
            .json(entity);

        check(request.send().await?).await.map(|_| ())
    }

    /// Insert or replace
    pub async fn upsert_entity<E: Serialize>(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        entity: &E,
    ) -> Result<(), TableError> {
        let request = self
            .request(Method::PUT, &entity_path(table, partition_key, row_key))?
            .json(entity);

        check(request.send().await?).await.map(|_| ())
    }

    /// Delete an entity; `NotFound` if it is missing
    pub async fn delete_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<(), TableError> {
        let request = self
            .request(Method::DELETE, &entity_path(table, partition_key, row_key))?
            .header("If-Match", "*");

        check(request.send().await?).await.map(|_| ())
    }

    /// Query a table, following continuation tokens until exhausted
    pub async fn query<E: DeserializeOwned>(
        &self,
        table: &str,
        filter: Option<&str>,
    ) -> Result<Vec<E>, TableError> {
        let mut entities = Vec::new();
        let mut continuation: Option<(String, Option<String>)> = None;

        loop {
            let mut params = Vec::new();
            if let Some(filter) = filter {
                params.push(format!("$filter={}", urlencoding::encode(filter)));
            }
            if let Some((next_partition, next_row)) = &continuation {
                params.push(format!("NextPartitionKey={}", urlencoding::encode(next_partition)));
                if let Some(next_row) = next_row {
                    params.push(format!("NextRowKey={}", urlencoding::encode(next_row)));
                }
            }

            let mut path = format!("/{}()", table);
            if !params.is_empty() {
                path.push('?');
                path.push_str(&params.join("&"));
            }

            let response = check(self.request(Method::GET, &path)?.send().await?).await?;
            let next_partition = header_value(&response, NEXT_PARTITION_HEADER);
            let next_row = header_value(&response, NEXT_ROW_HEADER);

            let page: QueryPage<E> = response.json().await?;
            debug!(table, count = page.value.len(), "Table query page received");
            entities.extend(page.value);

            match next_partition {
                Some(partition) => continuation = Some((partition, next_row)),
                None => break,
            }
        }

        Ok(entities)
    }

    fn request(&self, method: Method, path_and_query: &str) -> Result<RequestBuilder, TableError> {
        let url = Url::parse(&format!("{}{}", self.endpoint, path_and_query))
            .map_err(|e| TableError::InvalidUrl(e.to_string()))?;

        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let signature = self.sign(&date, url.path())?;

        Ok(self
            .http
            .request(method, url)
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION)
            .header("Accept", ODATA_ACCEPT)
            .header("DataServiceVersion", "3.0;NetFx")
            .header("MaxDataServiceVersion", "3.0;NetFx")
            .header(
                "Authorization",
                format!("SharedKeyLite {}:{}", self.account_name, signature),
            ))
    }

    /// SharedKeyLite: HMAC-SHA256 over the date and the canonical resource.
    fn sign(&self, date: &str, path: &str) -> Result<String, TableError> {
        let string_to_sign = format!("{}\n/{}{}", date, self.account_name, path);

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| TableError::InvalidKey(e.to_string()))?;
        mac.update(string_to_sign.as_bytes());

        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

async fn check(response: Response) -> Result<Response, TableError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(TableError::NotFound),
        StatusCode::CONFLICT => Err(TableError::Conflict),
        status => Err(TableError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        }),
    }
}

fn header_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// OData string literal: single quotes are doubled.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Equality filter on a string property
pub fn eq_filter(property: &str, value: &str) -> String {
    format!("{} eq {}", property, quote(value))
}

/// `/<table>(PartitionKey='..',RowKey='..')` with the key values escaped
pub fn entity_path(table: &str, partition_key: &str, row_key: &str) -> String {
    format!(
        "/{}(PartitionKey='{}',RowKey='{}')",
        table,
        urlencoding::encode(&partition_key.replace('\'', "''")),
        urlencoding::encode(&row_key.replace('\'', "''")),
    )
}
