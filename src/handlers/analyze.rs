//! Sequence analysis handler

use axum::{extract::rejection::JsonRejection, extract::State, Json};

use crate::models::{AnalyzeRequest, AnalyzeResponse};
use crate::{AppResult, AppState};

/// Classify one sequence
pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> AppResult<Json<AnalyzeResponse>> {
    let Json(req) = payload?;

    let result = state.service.handle(&req.sequence, req.options()).await?;

    tracing::info!(
        "Analyzed {} residues: {} ({:.1}ms)",
        result.sequence.len(),
        result.label,
        result.processing_time.as_secs_f64() * 1000.0
    );

    Ok(Json(result.into()))
}
