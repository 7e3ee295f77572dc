//! Model status handler

use axum::{extract::State, Json};

use crate::logic::service::ServiceStatus;
use crate::AppState;

/// Loaded backend and inference counters
pub async fn status(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.service.status())
}
