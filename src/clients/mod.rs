//! Clients for external services

pub mod table_client;

pub use table_client::{TableClient, TableError};
