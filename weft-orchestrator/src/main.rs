//! Weft Orchestrator
//!
//! Hosts the pipeline run engine behind a small HTTP API.
//!
//! Startup order:
//! - Configuration: YAML file plus environment overrides
//! - Storage: PostgreSQL pool and idempotent migrations
//! - Engine: node routing table, retarder clock and worker pool
//! - Recovery: unfinished runs are re-queued after a short delay
//! - API: axum server until Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weft_engine::{
    Engine, NodeGateway, PipelineRepository, PipelineRunRepository, PipelineRunService,
};

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;

use crate::config::Config;
use crate::repository::{PgPipelineRepository, PgPipelineRunRepository};
use crate::service::pipeline::PipelineService;

#[derive(Parser, Debug)]
#[command(name = "weft-orchestrator")]
#[command(about = "Pipeline run engine and HTTP API", long_about = None)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "WEFT_CONFIG", default_value = "./config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "weft_orchestrator={level},weft_engine={level},tower_http=debug",
                    level = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Weft Orchestrator...");
    tracing::info!("Connecting to database...");

    let pool = db::create_pool(&config.database_url, config.max_connections)
        .await
        .context("Failed to create database pool")?;

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let pipelines: Arc<dyn PipelineRepository> =
        Arc::new(PgPipelineRepository::new(pool.clone()));
    let runs: Arc<dyn PipelineRunRepository> = Arc::new(PgPipelineRunRepository::new(pool));

    let gateway =
        NodeGateway::from_routes(&config.nodes, reqwest::Client::new(), config.retry_policy());
    tracing::info!("Node routing table: {:?}", gateway);

    let cancel = CancellationToken::new();
    let engine = Engine::start(
        Arc::clone(&runs),
        Arc::new(gateway),
        &config.engine_settings(),
        cancel.clone(),
    );

    let run_service = PipelineRunService::new(Arc::clone(&pipelines), runs, engine.queue());
    run_service
        .recover(config.recovery_delay())
        .await
        .context("Failed to list unfinished pipeline runs")?;

    let app = api::create_router(api::AppState {
        pipelines: PipelineService::new(pipelines, run_service.clone()),
        runs: run_service,
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down...");
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    cancel.cancel();
    engine.join().await;

    tracing::info!("Weft Orchestrator stopped");
    Ok(())
}
