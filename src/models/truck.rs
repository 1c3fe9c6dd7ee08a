//! Truck model
//!
//! The single entity of the service, its status enum and the partial-update
//! patch shared by every repository backend.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::utils::errors::StoreError;

/// Operational status of a truck.
///
/// Only the table backend persists it, as the entity's partition key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TruckStatus {
    #[default]
    Available,
    OnDuty,
    Maintenance,
}

impl TruckStatus {
    pub const ALL: [TruckStatus; 3] = [
        TruckStatus::Available,
        TruckStatus::OnDuty,
        TruckStatus::Maintenance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TruckStatus::Available => "available",
            TruckStatus::OnDuty => "on_duty",
            TruckStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for TruckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TruckStatus {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TruckStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| StoreError::Validation(format!("Invalid status '{}'", value)))
    }
}

/// Truck record, keyed by `plate_number`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Truck {
    pub plate_number: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TruckStatus>,
}

impl Truck {
    pub fn new(
        plate_number: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
        note: Option<String>,
    ) -> Self {
        Self {
            plate_number: plate_number.into(),
            name: name.into(),
            description,
            note,
            status: None,
        }
    }

    pub fn with_status(mut self, status: TruckStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Checks the required fields before anything is persisted.
    pub fn validate_required(&self) -> Result<(), StoreError> {
        if self.plate_number.trim().is_empty() {
            return Err(StoreError::Validation("plate_number is required".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(StoreError::Validation("name is required".to_string()));
        }
        Ok(())
    }

    /// Merges the supplied fields of `patch` into this record.
    pub fn apply(&mut self, patch: TruckPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(note) = patch.note {
            self.note = Some(note);
        }
        if let Some(status) = patch.status {
            self.status = Some(status);
        }
    }
}

/// Partial update: `None` means "keep the stored value".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TruckPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub note: Option<String>,
    pub status: Option<TruckStatus>,
}

impl TruckPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.note.is_none()
            && self.status.is_none()
    }
}
