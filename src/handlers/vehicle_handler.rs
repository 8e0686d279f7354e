// src/handlers/vehicle_handler.rs
use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    errors::{FleetError, FleetResult},
    handlers::{AdminGuard, ExpectedRevision, FleetJson, SaveResponse},
    models::Vehicle,
    services::vehicle_service::VehicleOperations,
    state::AppState,
};

pub async fn list_vehicles(State(state): State<Arc<AppState>>) -> FleetResult<Json<Vec<Vehicle>>> {
    let vehicles = state.vehicle_service.list_vehicles().await?;
    Ok(Json(vehicles))
}

pub async fn save_vehicles(
    State(state): State<Arc<AppState>>,
    AdminGuard(_): AdminGuard,
    ExpectedRevision(expected): ExpectedRevision,
    FleetJson(vehicles): FleetJson<Vec<Vehicle>>,
) -> FleetResult<Json<SaveResponse>> {
    let revision = state.vehicle_service.save_vehicles(vehicles, expected).await?;
    Ok(Json(SaveResponse::saved(revision)))
}

pub async fn upsert_vehicle(
    State(state): State<Arc<AppState>>,
    AdminGuard(_): AdminGuard,
    Path(vehicle_id): Path<String>,
    FleetJson(mut vehicle): FleetJson<Vehicle>,
) -> FleetResult<Json<Vehicle>> {
    if vehicle.id.is_empty() {
        vehicle.id = vehicle_id;
    } else if vehicle.id != vehicle_id {
        return Err(FleetError::bad_request(format!(
            "Vehicle id {} does not match the path ({})",
            vehicle.id, vehicle_id
        )));
    }
    let saved = state.vehicle_service.upsert_vehicle(vehicle).await?;
    Ok(Json(saved))
}

pub async fn delete_vehicle(
    State(state): State<Arc<AppState>>,
    AdminGuard(_): AdminGuard,
    Path(vehicle_id): Path<String>,
) -> FleetResult<Json<Value>> {
    state.vehicle_service.delete_vehicle(&vehicle_id).await?;
    Ok(Json(json!({ "success": true })))
}
