//! Data Transfer Objects
//!
//! Request and response shapes exchanged between the HTTP API, the engine
//! and the remote node executors.

pub mod node;
pub mod pipeline;
pub mod pipeline_run;
