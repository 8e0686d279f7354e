// src/services/driver_service.rs
use async_trait::async_trait;
use std::sync::Arc;
use tracing;

use crate::{
    errors::{FleetError, FleetResult, ValidationError},
    models::{
        driver::is_valid_pin_format, duplicate_ids, Driver, DriverInput, DriverResponse, FleetData,
    },
    services::{auth_service::AdminAuthenticator, store_service::FleetStore},
    utils::id_generator::generate_driver_id,
};

#[async_trait]
pub trait DriverOperations: Send + Sync {
    async fn list_drivers(&self) -> FleetResult<Vec<DriverResponse>>;
    async fn upsert_driver(&self, input: DriverInput) -> FleetResult<DriverResponse>;
    async fn delete_driver(&self, driver_id: &str) -> FleetResult<()>;
    async fn save_drivers(&self, inputs: Vec<DriverInput>, expected_revision: Option<u64>) -> FleetResult<u64>;
    async fn change_pin(&self, driver_id: &str, pin: &str) -> FleetResult<DriverResponse>;
}

pub struct DriverService {
    store: Arc<dyn FleetStore>,
    authenticator: Arc<dyn AdminAuthenticator>,
}

impl DriverService {
    pub fn new(store: Arc<dyn FleetStore>, authenticator: Arc<dyn AdminAuthenticator>) -> Self {
        Self { store, authenticator }
    }

    fn to_response(&self, driver: &Driver) -> DriverResponse {
        driver.to_response()
    }

    /// Builds the stored driver; without a new PIN the stored one is kept, hashed
    /// first if it is still a legacy plaintext PIN.
    async fn resolve(&self, input: DriverInput, existing: Option<&Driver>) -> FleetResult<Driver> {
        let pin = match (input.pin.as_deref().filter(|p| !p.is_empty()), existing) {
            (Some(pin), _) => self.authenticator.hash_pin(pin).await?,
            (None, Some(d)) if !d.pin.is_empty() && !d.has_hashed_pin() => {
                self.authenticator.hash_pin(&d.pin).await?
            }
            (None, Some(d)) => d.pin.clone(),
            (None, None) => String::new(),
        };
        let id = input
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_driver_id);

        Ok(Driver {
            id,
            name: input.name.trim().to_string(),
            license: input.license.trim().to_string(),
            is_admin: input.is_admin,
            pin,
        })
    }

    /// Rules every new driver list must satisfy against the stored one.
    fn check_replacement(data: &FleetData, drivers: &[Driver]) -> FleetResult<()> {
        if data.drivers.iter().any(|d| d.is_admin) && !drivers.iter().any(|d| d.is_admin) {
            return Err(FleetError::Conflict("At least one admin driver must remain".to_string()));
        }
        if let Some(active) = data.active_mission() {
            if !drivers.iter().any(|d| d.id == active.driver_id) {
                return Err(FleetError::Conflict(format!(
                    "Driver {} is on the active mission",
                    active.driver_id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DriverOperations for DriverService {
    async fn list_drivers(&self) -> FleetResult<Vec<DriverResponse>> {
        let data = self.store.load().await?;
        Ok(data.drivers.iter().map(|d| self.to_response(d)).collect())
    }

    async fn upsert_driver(&self, input: DriverInput) -> FleetResult<DriverResponse> {
        FleetError::check(input.validate())?;

        let data = self.store.load().await?;
        let existing = input.id.as_deref().and_then(|id| data.driver(id.trim()));
        let driver = self.resolve(input, existing).await?;

        let mut drivers = data.drivers.clone();
        match drivers.iter_mut().find(|d| d.id == driver.id) {
            Some(slot) => *slot = driver.clone(),
            None => drivers.push(driver.clone()),
        }
        Self::check_replacement(&data, &drivers)?;

        self.store.save_drivers(drivers, data.revision).await?;
        tracing::info!("Saved driver {} ({})", driver.id, driver.name);
        Ok(self.to_response(&driver))
    }

    async fn delete_driver(&self, driver_id: &str) -> FleetResult<()> {
        let data = self.store.load().await?;
        if data.driver(driver_id).is_none() {
            return Err(FleetError::driver_not_found(driver_id));
        }

        let drivers: Vec<Driver> = data.drivers.iter().filter(|d| d.id != driver_id).cloned().collect();
        Self::check_replacement(&data, &drivers)?;

        self.store.save_drivers(drivers, data.revision).await?;
        tracing::info!("Deleted driver {}", driver_id);
        Ok(())
    }

    async fn save_drivers(&self, inputs: Vec<DriverInput>, expected_revision: Option<u64>) -> FleetResult<u64> {
        let mut errors: Vec<ValidationError> = Vec::new();
        for (index, input) in inputs.iter().enumerate() {
            errors.extend(input.validate().into_iter().map(|mut e| {
                e.field = format!("drivers[{}].{}", index, e.field);
                e
            }));
        }
        FleetError::check(errors)?;

        let data = self.store.load().await?;
        let mut drivers = Vec::with_capacity(inputs.len());
        for input in inputs {
            let existing = input.id.as_deref().and_then(|id| data.driver(id.trim()));
            drivers.push(self.resolve(input, existing).await?);
        }
        FleetError::check(duplicate_ids("drivers", drivers.iter().map(|d| d.id.as_str())))?;
        Self::check_replacement(&data, &drivers)?;

        let count = drivers.len();
        let revision = self
            .store
            .save_drivers(drivers, expected_revision.unwrap_or(data.revision))
            .await?;
        tracing::info!("Saved {} drivers (revision {})", count, revision);
        Ok(revision)
    }

    async fn change_pin(&self, driver_id: &str, pin: &str) -> FleetResult<DriverResponse> {
        if !is_valid_pin_format(pin) {
            return Err(FleetError::validation_error("pin", "PIN must be exactly 4 digits"));
        }

        let data = self.store.load().await?;
        let current = data
            .driver(driver_id)
            .ok_or_else(|| FleetError::driver_not_found(driver_id))?;
        let updated = Driver {
            pin: self.authenticator.hash_pin(pin).await?,
            ..current.clone()
        };

        let drivers = data
            .drivers
            .iter()
            .map(|d| if d.id == driver_id { updated.clone() } else { d.clone() })
            .collect();
        self.store.save_drivers(drivers, data.revision).await?;

        tracing::info!("PIN changed for driver {}", updated.name);
        Ok(self.to_response(&updated))
    }
}
