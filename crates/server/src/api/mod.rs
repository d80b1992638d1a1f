//! HTTP surface: run control, progress, and result retrieval.

pub mod scenarios;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;

use bioflow_engine::OrchestratorError;

use crate::state::AppState;

// ── Error plumbing ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

pub(crate) fn bad_request(msg: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: msg.into() }))
}

pub(crate) fn not_found(msg: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error: msg.into() }))
}

/// Map orchestrator errors onto the most specific status available.
pub(crate) fn orchestrator_error(e: OrchestratorError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        OrchestratorError::ScenarioAlreadyRunning(_) => StatusCode::CONFLICT,
        OrchestratorError::ScenarioNotFound(_) | OrchestratorError::CatchmentNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        OrchestratorError::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: e.to_string() }))
}

// ── Router ──────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/catchments", post(scenarios::catchment_create))
        .route("/scenarios", post(scenarios::scenario_create))
        .route("/scenarios/{id}", get(scenarios::scenario_get))
        .route(
            "/scenarios/{id}/configuration",
            put(scenarios::configuration_update),
        )
        .route(
            "/scenarios/{id}/run",
            post(scenarios::run_start).delete(scenarios::run_cancel),
        )
        .route("/scenarios/{id}/progress", get(scenarios::progress))
        .route("/scenarios/{id}/summary", get(scenarios::summary))
        .route(
            "/scenarios/{id}/layers/{algorithm}",
            get(scenarios::layer_get),
        )
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
