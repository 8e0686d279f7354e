// src/handlers/dashboard_handler.rs
use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{
    errors::FleetResult,
    models::UrgentVehicle,
    services::{summary_service::FleetSummary, vehicle_service::VehicleOperations},
    state::AppState,
};

pub async fn urgent_vehicles(State(state): State<Arc<AppState>>) -> FleetResult<Json<Vec<UrgentVehicle>>> {
    let urgent = state.vehicle_service.urgent_vehicles().await?;
    Ok(Json(urgent))
}

pub async fn summary(State(state): State<Arc<AppState>>) -> FleetResult<Json<FleetSummary>> {
    let summary = state.summary_service.fleet_summary().await?;
    Ok(Json(summary))
}
