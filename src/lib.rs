//! LAMP-PRo Classification Server
//!
//! Predicts whether a protein binds DNA, RNA, both (DRBP) or neither.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     LAMP-PRo SERVER                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  POST /analyze (Axum)                                        │
//! │        │                                                     │
//! │        ▼                                                     │
//! │  ┌───────────┐   ┌──────────────────────────────────────┐    │
//! │  │ Validator │──▶│ Backend (semaphore, deadline, retry) │    │
//! │  └───────────┘   │  local:  Embedder ─▶ Classifier       │    │
//! │                  │  remote: upstream HTTP predictor      │    │
//! │                  └──────────────────────────────────────┘    │
//! │                              │                               │
//! │                              ▼                               │
//! │                 label + (dna, rna, neither)                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod logic;
pub mod models;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{AppError, AppResult};

use logic::service::PredictionService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub config: config::Config,
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/model", get(handlers::model::status))
        .route("/analyze", post(handlers::analyze::analyze))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
