//! Shared application state
//!
//! Handed to every axum handler through the router.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::repositories::TruckRepository;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn TruckRepository>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(repository: Arc<dyn TruckRepository>, config: ServerConfig) -> Self {
        Self { repository, config }
    }
}
