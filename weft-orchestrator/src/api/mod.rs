//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod pipeline;
pub mod pipeline_run;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use weft_engine::PipelineRunService;

use crate::service::pipeline::PipelineService;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pipelines: PipelineService,
    pub runs: PipelineRunService,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/api/v1/pipeline/save", post(pipeline::save_pipeline))
        .route("/api/v1/pipeline/exec", post(pipeline::exec_pipeline))
        .route("/api/v1/pipeline/{name}", get(pipeline::get_pipeline))
        // Pipeline run endpoints
        .route(
            "/api/v1/pipelineRun/create",
            post(pipeline_run::create_pipeline_run),
        )
        .route(
            "/api/v1/pipelineRun/exec",
            post(pipeline_run::exec_pipeline_run),
        )
        .route(
            "/api/v1/pipelineRun/{id}",
            get(pipeline_run::get_pipeline_run),
        )
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
