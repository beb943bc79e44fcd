//! Core domain types
//!
//! This module contains the core domain structures used across Weft crates.
//! A [`pipeline::Pipeline`] is an immutable template; a
//! [`pipeline_run::PipelineRun`] is one execution of it carrying a frozen copy
//! of the template plus its mutable runtime status.

pub mod pipeline;
pub mod pipeline_run;

pub use pipeline::{KeyAndValue, Node, NodeSpec, ParamSpec, Pipeline, PipelineSpec, When};
pub use pipeline_run::{
    NodeStatus, NodeStatusSpec, PipelineRun, PipelineRunSpec, PipelineRunStatus, RunState,
};
