// src/handlers/mod.rs
use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post, put},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    errors::FleetError,
    services::auth_service::{AdminSession, AuthOperations},
    state::AppState,
};

pub mod admin_handler;
pub mod dashboard_handler;
pub mod data_handler;
pub mod driver_handler;
pub mod mission_handler;
pub mod vehicle_handler;

pub const REVISION_HEADER: &str = "x-fleet-revision";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(data_handler::health))
        .route("/api/data", get(data_handler::get_data))
        .route("/api/script-url", post(data_handler::save_script_url))
        .route("/api/admin/login", post(admin_handler::login))
        .route("/api/admin/logout", post(admin_handler::logout))
        .route(
            "/api/missions",
            get(mission_handler::list_missions).post(mission_handler::replace_missions),
        )
        .route("/api/missions/active", get(mission_handler::active_mission))
        .route("/api/missions/start", post(mission_handler::start_mission))
        .route("/api/missions/:id/end", post(mission_handler::end_mission))
        .route("/api/dashboard/urgent", get(dashboard_handler::urgent_vehicles))
        .route("/api/dashboard/summary", get(dashboard_handler::summary))
        .route(
            "/api/vehicles",
            get(vehicle_handler::list_vehicles).post(vehicle_handler::save_vehicles),
        )
        .route(
            "/api/vehicles/:id",
            put(vehicle_handler::upsert_vehicle).delete(vehicle_handler::delete_vehicle),
        )
        .route(
            "/api/drivers",
            get(driver_handler::list_drivers).post(driver_handler::save_drivers),
        )
        .route(
            "/api/drivers/:id",
            put(driver_handler::upsert_driver).delete(driver_handler::delete_driver),
        )
        .route("/api/drivers/:id/pin", put(driver_handler::change_pin))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Answer of the wholesale saves, shaped like the browser client expects.
#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub success: bool,
    pub revision: u64,
}

impl SaveResponse {
    pub fn saved(revision: u64) -> Self {
        Self { success: true, revision }
    }
}

/// JSON body extractor whose rejections use the fleet error envelope.
pub struct FleetJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for FleetJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = FleetError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(FleetJson(value))
    }
}

/// Present on every admin-only handler; rejects requests without a live session.
pub struct AdminGuard(pub AdminSession);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminGuard {
    type Rejection = FleetError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| FleetError::unauthorized("Missing bearer token"))?;

        let session = state.auth_service.validate_session(token).await?;
        Ok(AdminGuard(session))
    }
}

/// Key used to count failed PIN attempts: first `x-forwarded-for` hop, else `local`.
pub struct ClientKey(pub String);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientKey {
    type Rejection = FleetError;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .unwrap_or("local")
            .to_string();
        Ok(ClientKey(key))
    }
}

/// Optional revision a wholesale save was computed from.
pub struct ExpectedRevision(pub Option<u64>);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ExpectedRevision {
    type Rejection = FleetError;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        match parts.headers.get(REVISION_HEADER) {
            None => Ok(ExpectedRevision(None)),
            Some(value) => {
                let raw = value.to_str().unwrap_or_default().trim();
                raw.parse::<u64>()
                    .map(|revision| ExpectedRevision(Some(revision)))
                    .map_err(|_| FleetError::InvalidFieldValue {
                        field: REVISION_HEADER.to_string(),
                        value: raw.to_string(),
                        reason: "must be a non-negative integer".to_string(),
                    })
            }
        }
    }
}
