//! Flat-file truck repository
//!
//! The whole truck set is one JSON array, read in full on every operation
//! and rewritten in full on every change. Busy dates live in a sibling file
//! with the same shape as the relational `truck_availability` table.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Serialize};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{check_key, TruckRepository};
use crate::config::JsonFileConfig;
use crate::models::availability::filter_available;
use crate::models::{BusyDate, Truck, TruckPatch};
use crate::utils::errors::{truck_not_found, StoreError, StoreResult};

pub struct JsonTruckRepository {
    config: JsonFileConfig,
    /// Held across every load-modify-save so concurrent writers cannot lose
    /// each other's updates.
    write_lock: Mutex<()>,
}

impl JsonTruckRepository {
    /// Open the store, creating empty files when they do not exist yet
    pub async fn open(config: JsonFileConfig) -> StoreResult<Self> {
        for path in [&config.path, &config.availability_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::backend("open", &path.display().to_string(), e))?;
            }
            if fs::metadata(path).await.is_err() {
                info!("Initialising empty store file {}", path.display());
                write_json::<Vec<Truck>>(path, &Vec::new(), "open").await?;
            }
        }

        Ok(Self {
            config,
            write_lock: Mutex::new(()),
        })
    }

    /// Read every truck, in file order
    pub async fn load(&self) -> StoreResult<Vec<Truck>> {
        read_json(&self.config.path, "load").await
    }

    /// Replace the whole truck file with `trucks`
    pub async fn save(&self, trucks: &[Truck]) -> StoreResult<()> {
        write_json(&self.config.path, &trucks, "save").await
    }

    async fn load_busy(&self) -> StoreResult<Vec<BusyDate>> {
        read_json(&self.config.availability_path, "load_busy").await
    }

    async fn save_busy(&self, rows: &[BusyDate]) -> StoreResult<()> {
        write_json(&self.config.availability_path, &rows, "save_busy").await
    }

    async fn ensure_exists(&self, plate_number: &str) -> StoreResult<()> {
        let trucks = self.load().await?;
        if trucks.iter().any(|t| t.plate_number == plate_number) {
            Ok(())
        } else {
            Err(truck_not_found(plate_number))
        }
    }
}

#[async_trait]
impl TruckRepository for JsonTruckRepository {
    fn backend_name(&self) -> &'static str {
        "json"
    }

    async fn create(&self, mut truck: Truck) -> StoreResult<Truck> {
        truck.validate_required()?;
        // status is not part of the file format
        truck.status = None;

        let _guard = self.write_lock.lock().await;
        let mut trucks = self.load().await?;
        if trucks.iter().any(|t| t.plate_number == truck.plate_number) {
            return Err(StoreError::DuplicateKey(truck.plate_number));
        }

        trucks.push(truck.clone());
        self.save(&trucks).await?;
        debug!(plate_number = %truck.plate_number, "Truck written to file");
        Ok(truck)
    }

    async fn list_all(&self) -> StoreResult<Vec<Truck>> {
        self.load().await
    }

    async fn get(&self, plate_number: &str) -> StoreResult<Truck> {
        check_key(plate_number)?;
        self.load()
            .await?
            .into_iter()
            .find(|t| t.plate_number == plate_number)
            .ok_or_else(|| truck_not_found(plate_number))
    }

    async fn update(&self, plate_number: &str, patch: TruckPatch) -> StoreResult<Truck> {
        check_key(plate_number)?;

        let _guard = self.write_lock.lock().await;
        let mut trucks = self.load().await?;
        let truck = trucks
            .iter_mut()
            .find(|t| t.plate_number == plate_number)
            .ok_or_else(|| truck_not_found(plate_number))?;

        truck.apply(patch);
        truck.status = None;
        let updated = truck.clone();

        self.save(&trucks).await?;
        Ok(updated)
    }

    async fn delete(&self, plate_number: &str) -> StoreResult<()> {
        check_key(plate_number)?;

        let _guard = self.write_lock.lock().await;
        let mut trucks = self.load().await?;
        let index = trucks
            .iter()
            .position(|t| t.plate_number == plate_number)
            .ok_or_else(|| truck_not_found(plate_number))?;
        trucks.remove(index);

        // busy rows go first; a failed write leaves the truck in place
        let mut busy = self.load_busy().await?;
        let before = busy.len();
        busy.retain(|row| row.plate_number != plate_number);
        if busy.len() != before {
            self.save_busy(&busy).await?;
        }

        self.save(&trucks).await
    }

    async fn get_availability(&self, date: NaiveDate) -> StoreResult<Vec<Truck>> {
        let trucks = self.load().await?;
        let busy = self.load_busy().await?;
        Ok(filter_available(trucks, &busy, date))
    }

    async fn mark_busy(&self, plate_number: &str, date: NaiveDate) -> StoreResult<()> {
        check_key(plate_number)?;

        let _guard = self.write_lock.lock().await;
        self.ensure_exists(plate_number).await?;

        let row = BusyDate::new(plate_number, date);
        let mut busy = self.load_busy().await?;
        if !busy.contains(&row) {
            busy.push(row);
            self.save_busy(&busy).await?;
        }
        Ok(())
    }

    async fn clear_busy(&self, plate_number: &str, date: NaiveDate) -> StoreResult<()> {
        check_key(plate_number)?;

        let _guard = self.write_lock.lock().await;
        self.ensure_exists(plate_number).await?;

        let mut busy = self.load_busy().await?;
        let index = busy
            .iter()
            .position(|row| row.plate_number == plate_number && row.busy_date == date)
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "Truck {} has no busy date on {}",
                    plate_number, date
                ))
            })?;
        busy.remove(index);
        self.save_busy(&busy).await
    }
}

async fn read_json<T>(path: &Path, operation: &str) -> StoreResult<Vec<T>>
where
    T: DeserializeOwned,
{
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::backend(operation, &path.display().to_string(), e)),
    };

    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::backend(operation, &path.display().to_string(), e))
}

/// Writes to a temporary sibling first so readers never see a torn file.
async fn write_json<T>(path: &Path, value: &T, operation: &str) -> StoreResult<()>
where
    T: Serialize + ?Sized,
{
    let key = path.display().to_string();
    let bytes =
        serde_json::to_vec_pretty(value).map_err(|e| StoreError::backend(operation, &key, e))?;

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| StoreError::backend(operation, &key, e))?;
    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StoreError::backend(operation, &key, e))
}
