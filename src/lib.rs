//! Truck service
//!
//! CRUD and availability API for truck records, persisted in PostgreSQL, a
//! flat JSON file or a cloud table store behind one repository trait.

pub mod clients;
pub mod config;
pub mod controllers;
pub mod dto;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod state;
pub mod utils;

pub use config::AppConfig;
pub use repositories::TruckRepository;
pub use routes::create_router;
pub use state::AppState;
