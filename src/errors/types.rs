//! Top-level application error taxonomy.
//!
//! Five classes, matching the error-handling design: `Validation` and
//! `Precondition` are never fatal to the service and are surfaced to the
//! caller with a 400-class response; `Transient` is retried internally
//! before it ever reaches here; `Resource` failures are item-scoped and
//! never halt siblings; `Fatal` moves the owning service to its error
//! phase until an explicit Reset.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("precondition failed: {message}")]
    Precondition { message: String },

    #[error("transient error: {message}")]
    Transient { message: String },

    #[error("resource error: {message}")]
    Resource { message: String },

    #[error("fatal error: {message}")]
    Fatal { message: String },

    #[error("plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn precondition<S: Into<String>>(message: S) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    pub fn fatal<S: Into<String>>(message: S) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Whether this error belongs to the 400-class (caller can fix and retry).
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Precondition { .. })
            || matches!(self, Self::Config(ConfigError::Validation { .. }))
    }
}

/// Plan-engine specific errors (Modules A/B/C/D/E).
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("item not found: {item_id}")]
    ItemNotFound { item_id: String },

    #[error("duplicate item id: {item_id}")]
    DuplicateItem { item_id: String },

    #[error("invalid status transition for {item_id}: {from} -> {to}")]
    InvalidTransition {
        item_id: String,
        from: String,
        to: String,
    },

    #[error("plan file is corrupt and could not be recovered: {path}")]
    Corrupt { path: String },

    #[error("failed to resolve top-level source entry '{name}': {message}")]
    GenerationFailed { name: String, message: String },
}

/// Configuration manager errors (Module G).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("no configuration file at {path}")]
    NotFound { path: String },

    #[error("failed to parse configuration: {message}")]
    Parse { message: String },
}

/// RPC transport/protocol errors (Module I).
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("version mismatch: client={client}, server={server}")]
    VersionMismatch { client: String, server: String },

    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("transport closed unexpectedly")]
    Closed,

    #[error("malformed frame: {message}")]
    Malformed { message: String },
}

/// Service/process-lifecycle errors (Modules F/H).
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("service is already {state}")]
    WrongState { state: String },

    #[error("shutdown timeout exceeded")]
    ShutdownTimeout,

    #[error("worker process failed to start: {message}")]
    SpawnFailed { message: String },
}
