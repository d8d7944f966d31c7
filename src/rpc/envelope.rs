//! The versioned RPC envelope and message catalogue (§4.I, §6). Every
//! frame on the wire is one JSON-encoded `RpcRequest` or `RpcResponse`,
//! length-delimited so message boundaries survive TCP's stream semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Configuration;
use crate::plan::{ItemStatus, ItemType, PlanItem};
use crate::service::state::StatusSnapshot;

/// Bumped whenever a breaking wire change is made; compared verbatim
/// against the peer's version on every call (§4.I "Version gate").
pub const PROTOCOL_VERSION: &str = "v1.0.0";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanItemFilters {
    #[serde(default)]
    pub status: Option<Vec<ItemStatus>>,
    #[serde(default)]
    pub item_type: Option<Vec<ItemType>>,
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogStreamRequest {
    #[serde(default)]
    pub follow: bool,
    #[serde(default)]
    pub levels: Option<Vec<String>>,
    #[serde(default)]
    pub start_epoch: Option<i64>,
    #[serde(default)]
    pub end_epoch: Option<i64>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub max_lines: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    pub service: String,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "data")]
pub enum RpcRequestPayload {
    StartDownload {
        config: Configuration,
        plan_path: String,
        log_path: String,
    },
    StopDownload,
    ResetDownload,
    GetStatus,
    GetPlanItems {
        #[serde(default)]
        filters: PlanItemFilters,
    },
    ValidateConfig {
        config: Configuration,
    },
    HealthCheck,
    StreamLogs {
        request: LogStreamRequest,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub version: String,
    pub correlation_id: Uuid,
    pub payload: RpcRequestPayload,
}

impl RpcRequest {
    pub fn new(payload: RpcRequestPayload) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            correlation_id: Uuid::new_v4(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "data")]
pub enum RpcResponsePayload {
    StartDownload {
        success: bool,
        error_message: Option<String>,
    },
    StopDownload {
        success: bool,
    },
    ResetDownload {
        success: bool,
    },
    GetStatus(StatusSnapshot),
    GetPlanItems {
        items: Vec<PlanItem>,
        total: usize,
        filtered: usize,
    },
    ValidateConfig {
        valid: bool,
        errors: Vec<String>,
    },
    HealthCheck {
        liveness: bool,
        readiness: bool,
        service_health: String,
    },
    LogEntry(LogEntry),
    /// Terminates a `StreamLogs` response sequence (§4.I).
    StreamEnd,
    /// Returned instead of the requested payload when the caller's
    /// `version` does not match ours (§4.I "Version gate").
    VersionMismatch {
        server_version: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub version: String,
    pub correlation_id: Uuid,
    pub payload: RpcResponsePayload,
}

impl RpcResponse {
    pub fn new(correlation_id: Uuid, payload: RpcResponsePayload) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            correlation_id,
            payload,
        }
    }

    pub fn version_mismatch(correlation_id: Uuid) -> Self {
        Self::new(
            correlation_id,
            RpcResponsePayload::VersionMismatch {
                server_version: PROTOCOL_VERSION.to_string(),
            },
        )
    }
}
