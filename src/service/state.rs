//! Phase/state vocabulary for the DownloadService state machine (§4.F,
//! GLOSSARY "Phase", "State").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServicePhase {
    Idle,
    Generating,
    Optimizing,
    Executing,
    Completed,
    Stopping,
    Error,
}

/// The externally observable run-state: a coarser view of `ServicePhase`
/// used by the HTTP status surface (§6 "state").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceRunState {
    Idle,
    Running,
    Stopping,
    Error,
}

impl From<ServicePhase> for ServiceRunState {
    fn from(phase: ServicePhase) -> Self {
        match phase {
            ServicePhase::Idle | ServicePhase::Completed => ServiceRunState::Idle,
            ServicePhase::Generating | ServicePhase::Optimizing | ServicePhase::Executing => {
                ServiceRunState::Running
            }
            ServicePhase::Stopping => ServiceRunState::Stopping,
            ServicePhase::Error => ServiceRunState::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: ServiceRunState,
    pub phase: ServicePhase,
    pub progress_percentage: f64,
    pub total_tracks: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}
