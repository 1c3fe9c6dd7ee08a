use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::dto::truck_dto::{CreateTruckRequest, UpdateTruckRequest};
use crate::models::Truck;
use crate::repositories::TruckRepository;
use crate::utils::errors::{AppError, AppResult};
use crate::utils::validation::validate_date;

pub struct TruckController {
    repository: Arc<dyn TruckRepository>,
}

impl TruckController {
    pub fn new(repository: Arc<dyn TruckRepository>) -> Self {
        Self { repository }
    }

    pub async fn create(&self, request: CreateTruckRequest) -> AppResult<Truck> {
        info!("Processing request to create a new truck");
        request.validate()?;

        let truck = self.repository.create(request.into_truck()).await?;
        info!(plate_number = %truck.plate_number, "Truck created");
        Ok(truck)
    }

    pub async fn list(&self) -> AppResult<Vec<Truck>> {
        info!("Processing request to list all trucks");
        Ok(self.repository.list_all().await?)
    }

    pub async fn get(&self, plate_number: &str) -> AppResult<Truck> {
        info!(plate_number, "Processing request to get a truck by plate number");
        Ok(self.repository.get(plate_number).await?)
    }

    pub async fn update(&self, plate_number: &str, request: UpdateTruckRequest) -> AppResult<Truck> {
        info!(plate_number, "Processing request to update a truck");
        request.validate()?;

        // plate_number is the key and cannot change
        if let Some(body_plate) = request.plate_number.as_deref() {
            if body_plate != plate_number {
                return Err(AppError::BadRequest(
                    "plate_number cannot be changed".to_string(),
                ));
            }
        }

        let patch = request.into_patch();
        if patch.is_empty() {
            return Ok(self.repository.get(plate_number).await?);
        }
        Ok(self.repository.update(plate_number, patch).await?)
    }

    pub async fn delete(&self, plate_number: &str) -> AppResult<()> {
        info!(plate_number, "Processing request to delete a truck");
        self.repository.delete(plate_number).await?;
        Ok(())
    }

    /// A malformed date is reported as a server error, like any other
    /// failure of the availability query.
    pub async fn available_on(&self, date: &str) -> AppResult<Vec<Truck>> {
        info!(date, "Processing request to list available trucks");
        let date = validate_date(date)
            .map_err(|_| AppError::Internal(format!("Invalid availability date '{}'", date)))?;
        Ok(self.repository.get_availability(date).await?)
    }

    pub async fn mark_busy(&self, plate_number: &str, date: &str) -> AppResult<()> {
        info!(plate_number, date, "Processing request to mark a truck busy");
        let date = validate_date(date)
            .map_err(|_| AppError::BadRequest(format!("Invalid date '{}', expected YYYY-MM-DD", date)))?;
        Ok(self.repository.mark_busy(plate_number, date).await?)
    }

    pub async fn clear_busy(&self, plate_number: &str, date: &str) -> AppResult<()> {
        info!(plate_number, date, "Processing request to clear a busy date");
        let date = validate_date(date)
            .map_err(|_| AppError::BadRequest(format!("Invalid date '{}', expected YYYY-MM-DD", date)))?;
        Ok(self.repository.clear_busy(plate_number, date).await?)
    }
}
