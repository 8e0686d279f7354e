// src/services/export_service.rs
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing;

use crate::{
    errors::{FleetError, FleetResult},
    models::{Driver, Mission, Vehicle},
};

/// Body posted to the spreadsheet webhook: the mission plus the names a sheet row needs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    #[serde(flatten)]
    pub mission: Mission,
    pub vehicle_plate: String,
    pub vehicle_model: String,
    pub driver_name: String,
}

impl ExportPayload {
    pub fn new(mission: &Mission, vehicle: &Vehicle, driver: &Driver) -> Self {
        Self {
            mission: mission.clone(),
            vehicle_plate: vehicle.plate.clone(),
            vehicle_model: vehicle.model.clone(),
            driver_name: driver.name.clone(),
        }
    }
}

#[async_trait]
pub trait MissionExporter: Send + Sync {
    async fn export(&self, mission: &Mission, vehicle: &Vehicle, driver: &Driver, url: &str) -> FleetResult<()>;

    fn is_enabled(&self) -> bool {
        true
    }
}

pub struct WebhookExporter {
    client: reqwest::Client,
}

impl WebhookExporter {
    pub fn new(timeout: Duration) -> FleetResult<Self> {
        // Apps Script web apps answer every POST with a redirect
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MissionExporter for WebhookExporter {
    async fn export(&self, mission: &Mission, vehicle: &Vehicle, driver: &Driver, url: &str) -> FleetResult<()> {
        if url.is_empty() {
            return Ok(());
        }

        tracing::info!("Exporting mission {} to webhook", mission.id);
        let payload = ExportPayload::new(mission, vehicle, driver);

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(FleetError::Sync(format!("webhook answered {}: {}", status, body)));
        }

        tracing::debug!("Mission {} exported", mission.id);
        Ok(())
    }
}

/// Used when exports are switched off; accepts everything.
pub struct DisabledExporter;

#[async_trait]
impl MissionExporter for DisabledExporter {
    async fn export(&self, mission: &Mission, _: &Vehicle, _: &Driver, _: &str) -> FleetResult<()> {
        tracing::debug!("Export disabled, skipping mission {}", mission.id);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Runs the export in the background. Failures are logged and never reach the caller.
pub fn spawn_export(
    exporter: Arc<dyn MissionExporter>,
    mission: Mission,
    vehicle: Vehicle,
    driver: Driver,
    url: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = exporter.export(&mission, &vehicle, &driver, &url).await {
            tracing::warn!("Export of mission {} failed: {}", mission.id, e);
        }
    })
}
