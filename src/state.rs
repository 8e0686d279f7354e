// src/state.rs
use std::sync::Arc;

use crate::{
    config::AppConfig,
    errors::FleetResult,
    services::{
        auth_service::{AdminAuthenticator, AuthService, PinAuthenticator},
        driver_service::DriverService,
        export_service::{DisabledExporter, MissionExporter, WebhookExporter},
        mission_service::MissionService,
        store_service::{open_store, FleetStore},
        summary_service::{
            DisabledSummaryGenerator, GeminiSummaryGenerator, SummaryGenerator, SummaryService,
        },
        vehicle_service::VehicleService,
    },
};

pub struct AppState {
    pub store: Arc<dyn FleetStore>,
    pub mission_service: Arc<MissionService>,
    pub vehicle_service: Arc<VehicleService>,
    pub driver_service: Arc<DriverService>,
    pub auth_service: Arc<AuthService>,
    pub summary_service: Arc<SummaryService>,
    pub config: AppConfig,
}

impl AppState {
    pub async fn new(config: AppConfig) -> FleetResult<Self> {
        let store = open_store(&config.storage).await?;
        let exporter: Arc<dyn MissionExporter> = if config.export_enabled {
            Arc::new(WebhookExporter::new(config.export_timeout)?)
        } else {
            tracing::warn!("EXPORT_ENABLED is false, completed missions will not be exported");
            Arc::new(DisabledExporter)
        };

        let generator: Arc<dyn SummaryGenerator> = match &config.summary.api_key {
            Some(api_key) => Arc::new(GeminiSummaryGenerator::new(&config.summary, api_key.clone())?),
            None => {
                tracing::warn!("GEMINI_API_KEY not set, fleet summaries are disabled");
                Arc::new(DisabledSummaryGenerator)
            }
        };

        Ok(Self::with_parts(config, store, exporter, generator))
    }

    /// Wires the services around an already opened store.
    pub fn with_parts(
        config: AppConfig,
        store: Arc<dyn FleetStore>,
        exporter: Arc<dyn MissionExporter>,
        generator: Arc<dyn SummaryGenerator>,
    ) -> Self {
        let authenticator: Arc<dyn AdminAuthenticator> = Arc::new(PinAuthenticator::new(config.auth.pin_hash_cost));

        let mission_service = Arc::new(MissionService::new(store.clone(), exporter));
        let vehicle_service = Arc::new(VehicleService::new(store.clone()));
        let driver_service = Arc::new(DriverService::new(store.clone(), authenticator.clone()));
        let auth_service = Arc::new(AuthService::new(store.clone(), authenticator, &config.auth));
        let summary_service = Arc::new(SummaryService::new(store.clone(), generator));

        Self {
            store,
            mission_service,
            vehicle_service,
            driver_service,
            auth_service,
            summary_service,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageBackend;

    #[tokio::test]
    async fn test_state_with_export_switched_off() {
        let config = AppConfig {
            storage: StorageBackend::Memory,
            export_enabled: false,
            ..Default::default()
        };
        let state = AppState::new(config).await.unwrap();
        assert_eq!(state.store.backend_name(), "memory");
        assert!(!state.mission_service.exports_enabled());

        let config = AppConfig {
            storage: StorageBackend::Memory,
            ..Default::default()
        };
        let state = AppState::new(config).await.unwrap();
        assert!(state.mission_service.exports_enabled());
    }
}
