//! Truck repositories
//!
//! One CRUD + availability contract, three interchangeable backends. The
//! backend is picked from configuration at startup.

pub mod json_truck_repository;
pub mod pg_truck_repository;
pub mod table_truck_repository;

pub use json_truck_repository::JsonTruckRepository;
pub use pg_truck_repository::PgTruckRepository;
pub use table_truck_repository::TableTruckRepository;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;

use crate::config::BackendConfig;
use crate::models::{Truck, TruckPatch};
use crate::utils::errors::{StoreError, StoreResult};

/// Persistence contract for truck records.
///
/// Expected outcomes (`Validation`, `DuplicateKey`, `NotFound`) come back as
/// typed errors. Infrastructure failures are logged by the backend and
/// surface as `StoreError::Backend`.
#[async_trait]
pub trait TruckRepository: Send + Sync {
    /// Short name used in logs and the health endpoint
    fn backend_name(&self) -> &'static str;

    /// Persist a new truck. Fails with `DuplicateKey` if the plate is taken.
    async fn create(&self, truck: Truck) -> StoreResult<Truck>;

    async fn list_all(&self) -> StoreResult<Vec<Truck>>;

    async fn get(&self, plate_number: &str) -> StoreResult<Truck>;

    /// Merge the supplied fields into the stored truck.
    async fn update(&self, plate_number: &str, patch: TruckPatch) -> StoreResult<Truck>;

    /// Remove a truck together with its busy dates.
    async fn delete(&self, plate_number: &str) -> StoreResult<()>;

    /// Every truck without a busy row on exactly `date`.
    async fn get_availability(&self, date: NaiveDate) -> StoreResult<Vec<Truck>>;

    /// Record that a truck is busy on `date`. Recording it twice is a no-op.
    async fn mark_busy(&self, plate_number: &str, date: NaiveDate) -> StoreResult<()>;

    /// Remove a busy row. `NotFound` if the truck or the row does not exist.
    async fn clear_busy(&self, plate_number: &str, date: NaiveDate) -> StoreResult<()>;
}

/// Build the repository selected by `config`
pub async fn connect(config: &BackendConfig) -> StoreResult<Arc<dyn TruckRepository>> {
    let repository: Arc<dyn TruckRepository> = match config {
        BackendConfig::Postgres(db) => {
            info!("Connecting to PostgreSQL at {}", db.masked_url());
            let repository = PgTruckRepository::connect(db).await?;
            repository.ensure_schema().await?;
            Arc::new(repository)
        }
        BackendConfig::JsonFile(file) => {
            info!("Using JSON file store at {}", file.path.display());
            Arc::new(JsonTruckRepository::open(file.clone()).await?)
        }
        BackendConfig::Table(table) => {
            info!("Using table store at {}", table.endpoint);
            let repository = TableTruckRepository::new(table)?;
            repository.ensure_tables().await?;
            Arc::new(repository)
        }
    };

    Ok(repository)
}

/// Plate numbers arrive from path segments; reject blanks before any I/O.
pub(crate) fn check_key(plate_number: &str) -> StoreResult<()> {
    if plate_number.trim().is_empty() {
        return Err(StoreError::Validation("plate_number is required".to_string()));
    }
    Ok(())
}
