//! Pipeline API Handlers
//!
//! HTTP endpoints for pipeline templates.

use axum::{
    Json,
    extract::{Path, State},
};
use weft_core::domain::Pipeline;
use weft_core::dto::pipeline::{ExecPipeline, SavePipeline};
use weft_core::dto::pipeline_run::PipelineRunCreated;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /api/v1/pipeline/save
/// Create or replace a pipeline by name
pub async fn save_pipeline(
    State(state): State<AppState>,
    Json(req): Json<SavePipeline>,
) -> ApiResult<Json<Pipeline>> {
    tracing::info!("Saving pipeline: {}", req.pipeline.name);

    let pipeline = state.pipelines.save(req.pipeline).await?;
    Ok(Json(pipeline))
}

/// POST /api/v1/pipeline/exec
/// Start a run of a stored pipeline
pub async fn exec_pipeline(
    State(state): State<AppState>,
    Json(req): Json<ExecPipeline>,
) -> ApiResult<Json<PipelineRunCreated>> {
    tracing::info!("Executing pipeline: {}", req.name);

    let run = state.pipelines.exec(&req.name, req.params).await?;
    Ok(Json(PipelineRunCreated { id: run.id }))
}

/// GET /api/v1/pipeline/{name}
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Pipeline>> {
    tracing::debug!("Getting pipeline: {}", name);

    let pipeline = state.pipelines.get(&name).await?;
    Ok(Json(pipeline))
}
