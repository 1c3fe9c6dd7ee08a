//! Cloud table truck repository
//!
//! Each truck is one entity partitioned by status and keyed by plate number.
//! A third table maps every plate number to its current partition: one row
//! per truck, partition = plate number, fixed row key. Inserting that row is
//! what claims a plate, so two creates of the same plate cannot both land,
//! whatever status they carry.
//!
//! Busy dates live in a second table: partition = plate number,
//! row = `YYYY-MM-DD`.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{check_key, TruckRepository};
use crate::clients::table_client::{eq_filter, TableClient, TableError};
use crate::config::TableStorageConfig;
use crate::models::availability::filter_available;
use crate::models::{BusyDate, Truck, TruckPatch, TruckStatus, DATE_FORMAT};
use crate::utils::errors::{truck_not_found, StoreError, StoreResult};

const INDEX_ROW_KEY: &str = "status";

/// Wire shape of a truck entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TruckEntity {
    #[serde(rename = "PartitionKey")]
    pub partition_key: String,
    #[serde(rename = "RowKey")]
    pub row_key: String,
    pub plate_number: String,
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TruckEntity {
    pub fn from_truck(truck: &Truck, status: TruckStatus) -> Self {
        Self {
            partition_key: status.as_str().to_string(),
            row_key: truck.plate_number.clone(),
            plate_number: truck.plate_number.clone(),
            name: truck.name.clone(),
            status: status.as_str().to_string(),
            description: truck.description.clone(),
            note: truck.note.clone(),
        }
    }

    pub fn into_truck(self) -> Truck {
        let status = match self.partition_key.parse::<TruckStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                warn!(
                    plate_number = %self.row_key,
                    partition = %self.partition_key,
                    "Truck entity stored under an unknown status partition"
                );
                None
            }
        };

        Truck {
            plate_number: self.row_key,
            name: self.name,
            description: self.description,
            note: self.note,
            status,
        }
    }
}

/// Wire shape of a plate index row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct PlateIndexEntity {
    #[serde(rename = "PartitionKey")]
    partition_key: String,
    #[serde(rename = "RowKey")]
    row_key: String,
    /// Partition currently holding the truck entity
    status: String,
}

impl PlateIndexEntity {
    fn pointing_at(entity: &TruckEntity) -> Self {
        Self {
            partition_key: entity.row_key.clone(),
            row_key: INDEX_ROW_KEY.to_string(),
            status: entity.partition_key.clone(),
        }
    }
}

/// Wire shape of a busy-date entity
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BusyEntity {
    #[serde(rename = "PartitionKey")]
    partition_key: String,
    #[serde(rename = "RowKey")]
    row_key: String,
}

impl BusyEntity {
    fn new(plate_number: &str, date: NaiveDate) -> Self {
        Self {
            partition_key: plate_number.to_string(),
            row_key: date.format(DATE_FORMAT).to_string(),
        }
    }

    fn into_busy_date(self) -> Option<BusyDate> {
        NaiveDate::parse_from_str(&self.row_key, DATE_FORMAT)
            .ok()
            .map(|date| BusyDate::new(self.partition_key, date))
    }
}

pub struct TableTruckRepository {
    client: TableClient,
    truck_table: String,
    availability_table: String,
    index_table: String,
}

impl TableTruckRepository {
    pub fn new(config: &TableStorageConfig) -> StoreResult<Self> {
        let client = TableClient::new(config)
            .map_err(|e| StoreError::backend("connect", &config.account_name, e))?;

        Ok(Self {
            client,
            truck_table: config.truck_table.clone(),
            availability_table: config.availability_table.clone(),
            index_table: config.index_table.clone(),
        })
    }

    /// Create all three tables if they do not exist yet
    pub async fn ensure_tables(&self) -> StoreResult<()> {
        for table in [&self.truck_table, &self.availability_table, &self.index_table] {
            self.client
                .create_table(table)
                .await
                .map_err(|e| StoreError::backend("ensure_tables", table, e))?;
        }
        Ok(())
    }

    /// Resolve a plate number through the index, then read the entity from
    /// the partition the index names.
    async fn locate(&self, operation: &str, plate_number: &str) -> StoreResult<Option<TruckEntity>> {
        let index: Option<PlateIndexEntity> = self
            .client
            .get_entity(&self.index_table, plate_number, INDEX_ROW_KEY)
            .await
            .map_err(|e| StoreError::backend(operation, plate_number, e))?;
        let Some(index) = index else {
            return Ok(None);
        };

        let entity = self
            .client
            .get_entity(&self.truck_table, &index.status, plate_number)
            .await
            .map_err(|e| StoreError::backend(operation, plate_number, e))?;
        if entity.is_none() {
            debug!(plate_number, partition = %index.status, "Indexed truck entity not present");
        }
        Ok(entity)
    }

    async fn require(&self, operation: &str, plate_number: &str) -> StoreResult<TruckEntity> {
        self.locate(operation, plate_number)
            .await?
            .ok_or_else(|| truck_not_found(plate_number))
    }

    async fn point_index_at(&self, entity: &TruckEntity) -> Result<(), TableError> {
        self.client
            .replace_entity(
                &self.index_table,
                &entity.row_key,
                INDEX_ROW_KEY,
                &PlateIndexEntity::pointing_at(entity),
            )
            .await
    }

    /// Best-effort removal used when unwinding a failed write
    async fn undo_delete(&self, table: &str, partition_key: &str, row_key: &str) {
        match self.client.delete_entity(table, partition_key, row_key).await {
            Ok(()) | Err(TableError::NotFound) => {}
            Err(e) => warn!(table, partition_key, row_key, error = %e, "Could not undo write"),
        }
    }

    /// Status lives in the partition key, so a status change moves the
    /// entity: insert the new one, repoint the index, delete the old one.
    /// Any failure puts the earlier steps back.
    async fn move_partition(&self, old: &TruckEntity, new: &TruckEntity) -> StoreResult<()> {
        let key = new.row_key.as_str();
        self.client
            .insert_entity(&self.truck_table, new)
            .await
            .map_err(|e| StoreError::backend("update", key, e))?;

        if let Err(e) = self.point_index_at(new).await {
            self.undo_delete(&self.truck_table, &new.partition_key, key).await;
            return Err(StoreError::backend("update", key, e));
        }

        if let Err(e) = self
            .client
            .delete_entity(&self.truck_table, &old.partition_key, &old.row_key)
            .await
        {
            if let Err(undo) = self.point_index_at(old).await {
                warn!(plate_number = key, error = %undo, "Could not restore plate index");
            }
            self.undo_delete(&self.truck_table, &new.partition_key, key).await;
            return Err(StoreError::backend("update", key, e));
        }

        debug!(
            plate_number = key,
            from = %old.partition_key,
            to = %new.partition_key,
            "Truck moved to new status partition"
        );
        Ok(())
    }
}

#[async_trait]
impl TruckRepository for TableTruckRepository {
    fn backend_name(&self) -> &'static str {
        "table"
    }

    async fn create(&self, truck: Truck) -> StoreResult<Truck> {
        truck.validate_required()?;
        let status = truck.status.unwrap_or_default();
        let entity = TruckEntity::from_truck(&truck, status);

        // claiming the index row is what makes the plate unique
        match self
            .client
            .insert_entity(&self.index_table, &PlateIndexEntity::pointing_at(&entity))
            .await
        {
            Ok(()) => {}
            Err(TableError::Conflict) => return Err(StoreError::DuplicateKey(truck.plate_number)),
            Err(e) => return Err(StoreError::backend("create", &truck.plate_number, e)),
        }

        if let Err(e) = self.client.insert_entity(&self.truck_table, &entity).await {
            self.undo_delete(&self.index_table, &truck.plate_number, INDEX_ROW_KEY)
                .await;
            return Err(match e {
                TableError::Conflict => StoreError::DuplicateKey(truck.plate_number),
                e => StoreError::backend("create", &truck.plate_number, e),
            });
        }

        Ok(truck.with_status(status))
    }

    async fn list_all(&self) -> StoreResult<Vec<Truck>> {
        let entities: Vec<TruckEntity> = self
            .client
            .query(&self.truck_table, None)
            .await
            .map_err(|e| StoreError::backend("list_all", "*", e))?;

        Ok(entities.into_iter().map(TruckEntity::into_truck).collect())
    }

    async fn get(&self, plate_number: &str) -> StoreResult<Truck> {
        check_key(plate_number)?;
        Ok(self.require("get", plate_number).await?.into_truck())
    }

    async fn update(&self, plate_number: &str, patch: TruckPatch) -> StoreResult<Truck> {
        check_key(plate_number)?;
        let current = self.require("update", plate_number).await?;
        let old_status = current.partition_key.parse::<TruckStatus>().unwrap_or_default();

        let mut truck = current.clone().into_truck();
        truck.apply(patch);
        let new_status = truck.status.unwrap_or(old_status);
        let updated = TruckEntity::from_truck(&truck, new_status);

        if updated.partition_key == current.partition_key {
            self.client
                .replace_entity(&self.truck_table, &current.partition_key, plate_number, &updated)
                .await
                .map_err(|e| match e {
                    TableError::NotFound => truck_not_found(plate_number),
                    e => StoreError::backend("update", plate_number, e),
                })?;
        } else {
            self.move_partition(&current, &updated).await?;
        }

        Ok(truck.with_status(new_status))
    }

    async fn delete(&self, plate_number: &str) -> StoreResult<()> {
        check_key(plate_number)?;
        let current = self.require("delete", plate_number).await?;

        self.client
            .delete_entity(&self.truck_table, &current.partition_key, plate_number)
            .await
            .map_err(|e| match e {
                TableError::NotFound => truck_not_found(plate_number),
                e => StoreError::backend("delete", plate_number, e),
            })?;

        let busy: Vec<BusyEntity> = self
            .client
            .query(
                &self.availability_table,
                Some(&eq_filter("PartitionKey", plate_number)),
            )
            .await
            .map_err(|e| StoreError::backend("delete", plate_number, e))?;

        for row in busy {
            match self
                .client
                .delete_entity(&self.availability_table, &row.partition_key, &row.row_key)
                .await
            {
                Ok(()) | Err(TableError::NotFound) => {}
                Err(e) => return Err(StoreError::backend("delete", plate_number, e)),
            }
        }

        // released last so the plate cannot be reused while rows remain
        match self
            .client
            .delete_entity(&self.index_table, plate_number, INDEX_ROW_KEY)
            .await
        {
            Ok(()) | Err(TableError::NotFound) => Ok(()),
            Err(e) => Err(StoreError::backend("delete", plate_number, e)),
        }
    }

    async fn get_availability(&self, date: NaiveDate) -> StoreResult<Vec<Truck>> {
        let day = date.format(DATE_FORMAT).to_string();
        let busy: Vec<BusyEntity> = self
            .client
            .query(&self.availability_table, Some(&eq_filter("RowKey", &day)))
            .await
            .map_err(|e| StoreError::backend("get_availability", &day, e))?;
        let busy: Vec<BusyDate> = busy.into_iter().filter_map(BusyEntity::into_busy_date).collect();

        let trucks = self.list_all().await?;
        Ok(filter_available(trucks, &busy, date))
    }

    async fn mark_busy(&self, plate_number: &str, date: NaiveDate) -> StoreResult<()> {
        check_key(plate_number)?;
        self.require("mark_busy", plate_number).await?;

        let entity = BusyEntity::new(plate_number, date);
        self.client
            .upsert_entity(
                &self.availability_table,
                &entity.partition_key,
                &entity.row_key,
                &entity,
            )
            .await
            .map_err(|e| StoreError::backend("mark_busy", plate_number, e))
    }

    async fn clear_busy(&self, plate_number: &str, date: NaiveDate) -> StoreResult<()> {
        check_key(plate_number)?;
        self.require("clear_busy", plate_number).await?;

        let entity = BusyEntity::new(plate_number, date);
        self.client
            .delete_entity(&self.availability_table, &entity.partition_key, &entity.row_key)
            .await
            .map_err(|e| match e {
                TableError::NotFound => StoreError::NotFound(format!(
                    "Truck {} has no busy date on {}",
                    plate_number, date
                )),
                e => StoreError::backend("clear_busy", plate_number, e),
            })
    }
}
