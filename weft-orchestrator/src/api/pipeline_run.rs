//! Pipeline Run API Handlers
//!
//! HTTP endpoints for creating, resuming and inspecting runs.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use weft_core::domain::PipelineRun;
use weft_core::dto::pipeline_run::{CreatePipelineRun, ExecPipelineRun, PipelineRunCreated};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::pipeline::validate_pipeline;

/// POST /api/v1/pipelineRun/create
/// Create a run from an inline pipeline
pub async fn create_pipeline_run(
    State(state): State<AppState>,
    Json(req): Json<CreatePipelineRun>,
) -> ApiResult<Json<PipelineRunCreated>> {
    tracing::info!("Creating pipeline run of: {}", req.pipeline.name);

    validate_pipeline(&req.pipeline).map_err(ApiError::from)?;
    let run = state.runs.create_run_inline(req.pipeline, req.params).await?;

    Ok(Json(PipelineRunCreated { id: run.id }))
}

/// POST /api/v1/pipelineRun/exec
/// Schedule an existing run again
pub async fn exec_pipeline_run(
    State(state): State<AppState>,
    Json(req): Json<ExecPipelineRun>,
) -> ApiResult<StatusCode> {
    tracing::info!("Triggering pipeline run: {}", req.id);

    state.runs.trigger_run(req.id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /api/v1/pipelineRun/{id}
pub async fn get_pipeline_run(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<PipelineRun>> {
    tracing::debug!("Getting pipeline run: {}", id);

    let run = state.runs.get(id).await?;
    Ok(Json(run))
}
