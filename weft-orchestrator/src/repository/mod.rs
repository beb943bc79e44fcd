//! Repository Module
//!
//! PostgreSQL implementations of the engine's storage traits.

pub mod pipeline;
pub mod pipeline_run;

pub use pipeline::PgPipelineRepository;
pub use pipeline_run::PgPipelineRunRepository;
