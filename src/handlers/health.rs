//! Liveness handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    backend: &'static str,
    timestamp: i64,
}

/// Models are loaded before the listener starts, so a response means ready
pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.service.status().backend.kind,
        timestamp: chrono::Utc::now().timestamp(),
    })
}
