use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Truck, TruckPatch, TruckStatus};
use crate::utils::validation::{validate_not_blank, validate_status};

// Body of POST /trucks. Required fields are optional here so that a missing
// field is reported as a validation error instead of a body rejection.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTruckRequest {
    #[validate(required, length(min = 1, max = 255), custom = "validate_not_blank")]
    pub plate_number: Option<String>,

    #[validate(required, length(min = 1, max = 255), custom = "validate_not_blank")]
    pub name: Option<String>,

    pub description: Option<String>,
    pub note: Option<String>,

    #[validate(custom = "validate_status")]
    pub status: Option<String>,
}

impl CreateTruckRequest {
    /// Only call after `validate()` succeeded.
    pub fn into_truck(self) -> Truck {
        Truck {
            plate_number: self.plate_number.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            description: self.description,
            note: self.note,
            status: self.status.and_then(|s| s.parse::<TruckStatus>().ok()),
        }
    }
}

// Body of PUT /trucks/{id}. Omitted fields keep their stored value.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTruckRequest {
    /// Accepted only when it matches the path; the key is immutable.
    pub plate_number: Option<String>,

    #[validate(length(min = 1, max = 255), custom = "validate_not_blank")]
    pub name: Option<String>,

    pub description: Option<String>,
    pub note: Option<String>,

    #[validate(custom = "validate_status")]
    pub status: Option<String>,
}

impl UpdateTruckRequest {
    pub fn into_patch(self) -> TruckPatch {
        TruckPatch {
            name: self.name,
            description: self.description,
            note: self.note,
            status: self.status.and_then(|s| s.parse::<TruckStatus>().ok()),
        }
    }
}

// Plain confirmation body
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// Response of GET /health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
}
