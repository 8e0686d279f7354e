// src/handlers/driver_handler.rs
use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    errors::{FleetError, FleetResult},
    handlers::{AdminGuard, ExpectedRevision, FleetJson, SaveResponse},
    models::{DriverInput, DriverResponse, PinChange},
    services::driver_service::DriverOperations,
    state::AppState,
};

pub async fn list_drivers(State(state): State<Arc<AppState>>) -> FleetResult<Json<Vec<DriverResponse>>> {
    let drivers = state.driver_service.list_drivers().await?;
    Ok(Json(drivers))
}

pub async fn save_drivers(
    State(state): State<Arc<AppState>>,
    AdminGuard(_): AdminGuard,
    ExpectedRevision(expected): ExpectedRevision,
    FleetJson(drivers): FleetJson<Vec<DriverInput>>,
) -> FleetResult<Json<SaveResponse>> {
    let revision = state.driver_service.save_drivers(drivers, expected).await?;
    Ok(Json(SaveResponse::saved(revision)))
}

pub async fn upsert_driver(
    State(state): State<Arc<AppState>>,
    AdminGuard(_): AdminGuard,
    Path(driver_id): Path<String>,
    FleetJson(mut input): FleetJson<DriverInput>,
) -> FleetResult<Json<DriverResponse>> {
    match input.id.as_deref().filter(|id| !id.is_empty()) {
        None => input.id = Some(driver_id),
        Some(id) if id != driver_id => {
            return Err(FleetError::bad_request(format!(
                "Driver id {} does not match the path ({})",
                id, driver_id
            )));
        }
        Some(_) => {}
    }
    let saved = state.driver_service.upsert_driver(input).await?;
    Ok(Json(saved))
}

pub async fn delete_driver(
    State(state): State<Arc<AppState>>,
    AdminGuard(_): AdminGuard,
    Path(driver_id): Path<String>,
) -> FleetResult<Json<Value>> {
    state.driver_service.delete_driver(&driver_id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn change_pin(
    State(state): State<Arc<AppState>>,
    AdminGuard(session): AdminGuard,
    Path(driver_id): Path<String>,
    FleetJson(change): FleetJson<PinChange>,
) -> FleetResult<Json<DriverResponse>> {
    tracing::info!("{} is changing the PIN of driver {}", session.driver_name, driver_id);
    let driver = state.driver_service.change_pin(&driver_id, change.pin.trim()).await?;
    Ok(Json(driver))
}
