//! Weft Core
//!
//! Core types and abstractions for the Weft pipeline engine.
//!
//! This crate contains:
//! - Domain types: Pipeline templates, runs and per-node status records
//! - DTOs: Request/response shapes shared by the engine, the HTTP API and
//!   the remote node executors

pub mod domain;
pub mod dto;
