//! Validation helpers
//!
//! Custom validators used by the request DTOs and path parameters.

use chrono::NaiveDate;
use validator::ValidationError;

use crate::models::{TruckStatus, DATE_FORMAT};

/// Validate and convert a `YYYY-MM-DD` string into a date
pub fn validate_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| {
        let mut error = ValidationError::new("date");
        error.add_param("value".into(), &value.to_string());
        error.add_param("format".into(), &"YYYY-MM-DD".to_string());
        error
    })
}

/// Reject strings made only of whitespace
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("not_blank");
        error.add_param("value".into(), &value.to_string());
        return Err(error);
    }
    Ok(())
}

/// Validate a truck status against the known values
pub fn validate_status(value: &str) -> Result<(), ValidationError> {
    if value.parse::<TruckStatus>().is_err() {
        let allowed: Vec<&str> = TruckStatus::ALL.iter().map(|s| s.as_str()).collect();
        let mut error = ValidationError::new("status");
        error.add_param("value".into(), &value.to_string());
        error.add_param("allowed_values".into(), &allowed);
        return Err(error);
    }
    Ok(())
}
