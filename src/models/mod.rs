//! Data models
//!
//! Truck records and the busy-date relation used for availability.

pub mod availability;
pub mod truck;

pub use availability::{BusyDate, DATE_FORMAT};
pub use truck::{Truck, TruckPatch, TruckStatus};
