// src/handlers/data_handler.rs
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    errors::FleetResult,
    handlers::{AdminGuard, ExpectedRevision, FleetJson, SaveResponse},
    models::FleetSnapshot,
    services::mission_service::MissionOperations,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ScriptUrlRequest {
    #[serde(default)]
    pub url: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "storage": state.store.backend_name(),
    }))
}

pub async fn get_data(State(state): State<Arc<AppState>>) -> FleetResult<Json<FleetSnapshot>> {
    let data = state.store.load().await?;
    Ok(Json(data.snapshot()))
}

pub async fn save_script_url(
    State(state): State<Arc<AppState>>,
    AdminGuard(session): AdminGuard,
    ExpectedRevision(expected): ExpectedRevision,
    FleetJson(request): FleetJson<ScriptUrlRequest>,
) -> FleetResult<Json<SaveResponse>> {
    tracing::debug!("{} is updating the export webhook", session.driver_name);
    let revision = state.mission_service.save_script_url(&request.url, expected).await?;
    Ok(Json(SaveResponse::saved(revision)))
}
