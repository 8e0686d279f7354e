// src/handlers/admin_handler.rs
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    errors::FleetResult,
    handlers::{AdminGuard, ClientKey, FleetJson},
    services::auth_service::{AdminSession, AuthOperations, LoginRequest},
    state::AppState,
};

pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientKey(client): ClientKey,
    FleetJson(request): FleetJson<LoginRequest>,
) -> FleetResult<Json<AdminSession>> {
    let session = state.auth_service.login(request.pin.trim(), &client).await?;
    Ok(Json(session))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    AdminGuard(session): AdminGuard,
) -> FleetResult<Json<Value>> {
    state.auth_service.logout(&session.token).await?;
    Ok(Json(json!({ "success": true })))
}
