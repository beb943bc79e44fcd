//! Service Module
//!
//! Business logic layer for the orchestrator. Run operations live in the
//! engine's `PipelineRunService`; pipeline template management lives here.

pub mod pipeline;
