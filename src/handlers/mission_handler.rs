// src/handlers/mission_handler.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::{
    errors::FleetResult,
    handlers::{AdminGuard, ExpectedRevision, FleetJson, SaveResponse},
    models::{EndMissionRequest, Mission, MissionFilter, StartMissionRequest},
    services::mission_service::{ActiveMissionView, MissionOperations},
    state::AppState,
};

pub async fn list_missions(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<MissionFilter>,
) -> FleetResult<Json<Vec<Mission>>> {
    let missions = state.mission_service.list_missions(filter).await?;
    Ok(Json(missions))
}

pub async fn active_mission(State(state): State<Arc<AppState>>) -> FleetResult<Json<Option<ActiveMissionView>>> {
    let active = state.mission_service.active_mission().await?;
    Ok(Json(active))
}

pub async fn start_mission(
    State(state): State<Arc<AppState>>,
    FleetJson(request): FleetJson<StartMissionRequest>,
) -> FleetResult<(StatusCode, Json<Mission>)> {
    let mission = state.mission_service.start_mission(request).await?;
    Ok((StatusCode::CREATED, Json(mission)))
}

pub async fn end_mission(
    State(state): State<Arc<AppState>>,
    Path(mission_id): Path<String>,
    FleetJson(request): FleetJson<EndMissionRequest>,
) -> FleetResult<Json<Mission>> {
    let mission = state.mission_service.end_mission(&mission_id, request).await?;
    Ok(Json(mission))
}

pub async fn replace_missions(
    State(state): State<Arc<AppState>>,
    AdminGuard(session): AdminGuard,
    ExpectedRevision(expected): ExpectedRevision,
    FleetJson(missions): FleetJson<Vec<Mission>>,
) -> FleetResult<Json<SaveResponse>> {
    tracing::info!("{} is replacing the mission log", session.driver_name);
    let revision = state.mission_service.replace_missions(missions, expected).await?;
    Ok(Json(SaveResponse::saved(revision)))
}
