use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub storage: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = if state.data.db().ping().await.is_ok() {
        "connected"
    } else {
        "disconnected"
    };

    // A missing object is still a successful round trip
    let storage_status = if state.data.storage().file_exists("health-check").await.is_ok() {
        "connected"
    } else {
        "disconnected"
    };

    let status = if db_status == "connected" { "ok" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        database: db_status.to_string(),
        storage: storage_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
