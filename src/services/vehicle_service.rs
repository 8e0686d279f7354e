// src/services/vehicle_service.rs
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use tracing;

use crate::{
    errors::{FleetError, FleetResult},
    models::{duplicate_ids, urgent_vehicles, FleetData, UrgentVehicle, Vehicle},
    services::store_service::FleetStore,
    utils::id_generator::{IdType, WithGeneratedId},
};

#[async_trait]
pub trait VehicleOperations: Send + Sync {
    async fn list_vehicles(&self) -> FleetResult<Vec<Vehicle>>;
    async fn upsert_vehicle(&self, vehicle: Vehicle) -> FleetResult<Vehicle>;
    async fn delete_vehicle(&self, vehicle_id: &str) -> FleetResult<()>;
    async fn save_vehicles(&self, vehicles: Vec<Vehicle>, expected_revision: Option<u64>) -> FleetResult<u64>;
    async fn urgent_vehicles(&self) -> FleetResult<Vec<UrgentVehicle>>;
}

pub struct VehicleService {
    store: Arc<dyn FleetStore>,
}

impl VehicleService {
    pub fn new(store: Arc<dyn FleetStore>) -> Self {
        Self { store }
    }

    pub async fn urgent_vehicles_on(&self, today: NaiveDate) -> FleetResult<Vec<UrgentVehicle>> {
        let data = self.store.load().await?;
        Ok(urgent_vehicles(&data.vehicles, today))
    }

    fn prepare(vehicle: Vehicle) -> Vehicle {
        let vehicle = Vehicle {
            plate: vehicle.plate.trim().to_string(),
            model: vehicle.model.trim().to_string(),
            ..vehicle
        };
        if vehicle.id.trim().is_empty() {
            vehicle.with_generated_id(IdType::Vehicle)
        } else {
            vehicle
        }
    }

    fn check_active_vehicle_kept(data: &FleetData, vehicles: &[Vehicle]) -> FleetResult<()> {
        if let Some(active) = data.active_mission() {
            if !vehicles.iter().any(|v| v.id == active.vehicle_id) {
                return Err(FleetError::Conflict(format!(
                    "Vehicle {} is in use by the active mission",
                    active.vehicle_id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VehicleOperations for VehicleService {
    async fn list_vehicles(&self) -> FleetResult<Vec<Vehicle>> {
        Ok(self.store.load().await?.vehicles)
    }

    async fn upsert_vehicle(&self, vehicle: Vehicle) -> FleetResult<Vehicle> {
        FleetError::check(vehicle.validate())?;
        let vehicle = Self::prepare(vehicle);

        let data = self.store.load().await?;
        let mut vehicles = data.vehicles.clone();
        match vehicles.iter_mut().find(|v| v.id == vehicle.id) {
            Some(existing) => {
                tracing::info!("Updating vehicle {} ({})", vehicle.id, vehicle.plate);
                *existing = vehicle.clone();
            }
            None => {
                tracing::info!("Adding vehicle {} ({})", vehicle.id, vehicle.plate);
                vehicles.push(vehicle.clone());
            }
        }

        self.store.save_vehicles(vehicles, data.revision).await?;
        Ok(vehicle)
    }

    async fn delete_vehicle(&self, vehicle_id: &str) -> FleetResult<()> {
        let data = self.store.load().await?;
        if data.vehicle(vehicle_id).is_none() {
            return Err(FleetError::vehicle_not_found(vehicle_id));
        }

        let vehicles: Vec<Vehicle> = data.vehicles.iter().filter(|v| v.id != vehicle_id).cloned().collect();
        Self::check_active_vehicle_kept(&data, &vehicles)?;

        self.store.save_vehicles(vehicles, data.revision).await?;
        tracing::info!("Deleted vehicle {}", vehicle_id);
        Ok(())
    }

    async fn save_vehicles(&self, vehicles: Vec<Vehicle>, expected_revision: Option<u64>) -> FleetResult<u64> {
        let mut errors = Vec::new();
        for (index, vehicle) in vehicles.iter().enumerate() {
            errors.extend(vehicle.validate().into_iter().map(|mut e| {
                e.field = format!("vehicles[{}].{}", index, e.field);
                e
            }));
        }
        let vehicles: Vec<Vehicle> = vehicles.into_iter().map(Self::prepare).collect();
        errors.extend(duplicate_ids("vehicles", vehicles.iter().map(|v| v.id.as_str())));
        FleetError::check(errors)?;

        let data = self.store.load().await?;
        Self::check_active_vehicle_kept(&data, &vehicles)?;

        let count = vehicles.len();
        let revision = self
            .store
            .save_vehicles(vehicles, expected_revision.unwrap_or(data.revision))
            .await?;
        tracing::info!("Saved {} vehicles (revision {})", count, revision);
        Ok(revision)
    }

    async fn urgent_vehicles(&self) -> FleetResult<Vec<UrgentVehicle>> {
        self.urgent_vehicles_on(fleet_today()).await
    }
}

/// Calendar day used for expiry checks: the server's local date, set through `TZ`.
pub fn fleet_today() -> NaiveDate {
    Local::now().date_naive()
}
