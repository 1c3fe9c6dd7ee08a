//! Busy-date rows
//!
//! A truck is available on a date unless one of these rows exists for it.
//! Rows are kept as history until cleared explicitly or until their truck
//! is deleted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashSet;

use crate::models::truck::Truck;

/// Format accepted for dates in paths and persisted rows
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq, Hash)]
pub struct BusyDate {
    pub plate_number: String,
    pub busy_date: NaiveDate,
}

impl BusyDate {
    pub fn new(plate_number: impl Into<String>, busy_date: NaiveDate) -> Self {
        Self {
            plate_number: plate_number.into(),
            busy_date,
        }
    }
}

/// Anti-join used by the backends that cannot push it down to a query:
/// keeps every truck that has no busy row on exactly `date`.
pub fn filter_available<'a>(
    trucks: Vec<Truck>,
    busy: impl IntoIterator<Item = &'a BusyDate>,
    date: NaiveDate,
) -> Vec<Truck> {
    let busy_plates: HashSet<&str> = busy
        .into_iter()
        .filter(|row| row.busy_date == date)
        .map(|row| row.plate_number.as_str())
        .collect();

    trucks
        .into_iter()
        .filter(|truck| !busy_plates.contains(truck.plate_number.as_str()))
        .collect()
}
