//! Scenario registration, run control, progress, and result endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wkt::TryFromWkt;

use bioflow_core::{Catchment, RunState};
use bioflow_engine::{
    LayerData, ScenarioCatalog, ScenarioConfig, ScenarioProgress, ScenarioRecord, ScenarioSummary,
};

use crate::state::AppState;

use super::{bad_request, not_found, orchestrator_error, ApiResult};

// ── Registration ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateCatchmentRequest {
    pub name: String,
    /// Catchment geometry as WKT (POLYGON or MULTIPOLYGON, lon/lat).
    pub geom: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: Uuid,
}

/// POST /catchments -- register a catchment geometry.
pub async fn catchment_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCatchmentRequest>,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    let geom: geo_types::Geometry<f64> = geo_types::Geometry::try_from_wkt_str(&req.geom)
        .map_err(|e| bad_request(format!("invalid WKT: {e}")))?;
    let geom = match geom {
        geo_types::Geometry::Polygon(p) => geo_types::MultiPolygon(vec![p]),
        geo_types::Geometry::MultiPolygon(mp) => mp,
        _ => return Err(bad_request("catchment geometry must be areal")),
    };

    let id = Uuid::new_v4();
    state
        .catalog
        .insert_catchment(Catchment {
            id,
            name: req.name,
            geom,
        })
        .await;

    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

#[derive(Debug, Deserialize)]
pub struct CreateScenarioRequest {
    pub name: String,
    #[serde(default)]
    pub region_id: Option<Uuid>,
    pub catchment_id: Uuid,
    #[serde(default)]
    pub config: ScenarioConfig,
}

/// POST /scenarios -- register a scenario with its configuration.
pub async fn scenario_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateScenarioRequest>,
) -> ApiResult<(StatusCode, Json<CreatedResponse>)> {
    let id = Uuid::new_v4();
    state
        .catalog
        .insert_scenario(ScenarioRecord {
            id,
            name: req.name,
            region_id: req.region_id.unwrap_or_else(Uuid::new_v4),
            catchment_id: req.catchment_id,
            run_state: RunState::Changed,
            config: req.config,
        })
        .await;

    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

#[derive(Debug, Serialize)]
pub struct ScenarioResponse {
    pub id: Uuid,
    pub name: String,
    pub region_id: Uuid,
    pub catchment_id: Uuid,
    pub state: RunState,
    pub config: ScenarioConfig,
}

/// GET /scenarios/{id}
pub async fn scenario_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ScenarioResponse>> {
    let scenario = state
        .catalog
        .get(id)
        .await
        .map_err(orchestrator_error)?
        .ok_or_else(|| not_found(format!("scenario not found: {id}")))?;

    Ok(Json(ScenarioResponse {
        id: scenario.id,
        name: scenario.name,
        region_id: scenario.region_id,
        catchment_id: scenario.catchment_id,
        state: scenario.run_state,
        config: scenario.config,
    }))
}

/// PUT /scenarios/{id}/configuration -- rejected with 409 while running.
pub async fn configuration_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(config): Json<ScenarioConfig>,
) -> ApiResult<StatusCode> {
    state
        .catalog
        .update_configuration(id, config)
        .await
        .map_err(orchestrator_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Run control ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RunStartedResponse {
    pub jobs: Vec<Uuid>,
}

/// POST /scenarios/{id}/run -- dispatch and return immediately.
pub async fn run_start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<RunStartedResponse>)> {
    let jobs = state
        .orchestrator
        .start_run(id)
        .await
        .map_err(orchestrator_error)?;
    Ok((StatusCode::ACCEPTED, Json(RunStartedResponse { jobs })))
}

/// DELETE /scenarios/{id}/run -- best-effort cancellation.
pub async fn run_cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .orchestrator
        .cancel_run(id)
        .await
        .map_err(orchestrator_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Results ─────────────────────────────────────────────────────

/// GET /scenarios/{id}/progress
pub async fn progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ScenarioProgress>> {
    let progress = state
        .orchestrator
        .progress(id)
        .await
        .map_err(orchestrator_error)?;
    Ok(Json(progress))
}

/// GET /scenarios/{id}/summary
pub async fn summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ScenarioSummary>> {
    let summary = state
        .orchestrator
        .result_summary(id)
        .await
        .map_err(orchestrator_error)?;
    Ok(Json(summary))
}

/// GET /scenarios/{id}/layers/{algorithm}
pub async fn layer_get(
    State(state): State<Arc<AppState>>,
    Path((id, algorithm)): Path<(Uuid, String)>,
) -> ApiResult<Json<LayerData>> {
    let layer = state
        .orchestrator
        .layer(id, &algorithm)
        .await
        .map_err(orchestrator_error)?
        .ok_or_else(|| not_found(format!("no result layer for algorithm '{algorithm}'")))?;
    Ok(Json(layer))
}
