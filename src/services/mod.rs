// src/services/mod.rs
pub mod auth_service;
pub mod driver_service;
pub mod export_service;
pub mod mission_service;
pub mod store_service;
pub mod summary_service;
pub mod vehicle_service;
