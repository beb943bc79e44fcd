//! Weft engine
//!
//! Executes pipeline runs: a bounded queue of run ids drained by a worker
//! pool, each delivery advancing one run by one node. Node work happens in
//! executors reached through the [`gateway`]; failed invocations come back
//! through the [`retarder`] after a delay.
//!
//! Storage is abstract ([`repository`]); the orchestrator binary plugs in
//! PostgreSQL, tests use the in-memory implementations.

pub mod engine;
pub mod error;
pub mod gateway;
pub mod lease;
pub mod repository;
pub mod resolver;
pub mod retarder;
pub mod runner;
pub mod service;

pub use engine::{Engine, EngineSettings, RetarderSettings};
pub use error::{EngineError, Result};
pub use gateway::{NodeExecutor, NodeGateway, NodeRoute, RetryPolicy};
pub use repository::{PipelineRepository, PipelineRunRepository, RepositoryError};
pub use retarder::Retarder;
pub use runner::{Advance, RunQueue, Runner};
pub use service::PipelineRunService;
