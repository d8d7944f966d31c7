//! Error type definitions used throughout cratedigger.
//!
//! Mirrors the hierarchical error system of the teacher crate: a top-level
//! `AppError` that groups per-layer sub-errors behind `#[from]`, so call
//! sites can use `?` everywhere and handlers at the edges (HTTP, RPC) map
//! the taxonomy to their own wire representations.

pub mod types;

pub use types::{AppError, ConfigError, PlanError, RpcError, ServiceError};
