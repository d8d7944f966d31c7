//! [MODULE A] PlanItem — per-item identity, status, hierarchy and mutation API.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::errors::PlanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemType {
    Track,
    Album,
    Artist,
    Playlist,
    M3u,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl ItemStatus {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// The core plan entity. One node in the hierarchical execution plan.
///
/// Invariants enforced by the mutator methods below (never by callers
/// mutating fields directly, which is why every field outside this module
/// is read through an accessor):
/// - `progress == 1.0` iff `status` is `Completed` or `Skipped`.
/// - `started_at` is set iff `status != Pending`.
/// - `completed_at` is set iff `status` is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanItem {
    pub item_id: String,
    pub item_type: ItemType,
    pub source_id: String,
    pub source_url: Option<String>,
    pub alt_url: Option<String>,
    pub parent_id: String,
    pub child_ids: Vec<String>,
    pub name: String,
    pub status: ItemStatus,
    #[serde(default)]
    pub error: String,
    pub file_path: Option<String>,
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl PlanItem {
    /// `<type>:<source-id>` — stable, dedup-friendly identifier.
    pub fn make_id(item_type: ItemType, source_id: &str) -> String {
        format!("{item_type}:{source_id}")
    }

    pub fn new(item_type: ItemType, source_id: impl Into<String>, name: impl Into<String>) -> Self {
        let source_id = source_id.into();
        let item_id = Self::make_id(item_type, &source_id);
        Self {
            item_id,
            item_type,
            source_id,
            source_url: None,
            alt_url: None,
            parent_id: String::new(),
            child_ids: Vec::new(),
            name: name.into(),
            status: ItemStatus::Pending,
            error: String::new(),
            file_path: None,
            progress: 0.0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            metadata: HashMap::new(),
        }
    }

    /// Additional parents a deduplicated track also belongs to (§9 cyclic
    /// hierarchy design note). Read by statistics; never by M3U generation,
    /// which only follows `parent_id`.
    pub fn child_of(&self) -> Vec<String> {
        self.metadata
            .get("child_of")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn add_child_of(&mut self, container_id: impl Into<String>) {
        let mut set = self.child_of();
        let container_id = container_id.into();
        if !set.contains(&container_id) {
            set.push(container_id);
            self.metadata.insert(
                "child_of".to_string(),
                Value::Array(set.into_iter().map(Value::String).collect()),
            );
        }
    }

    fn transition_error(&self, to: ItemStatus) -> PlanError {
        PlanError::InvalidTransition {
            item_id: self.item_id.clone(),
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    /// pending -> in_progress
    pub fn mark_started(&mut self) -> Result<(), PlanError> {
        if self.status != ItemStatus::Pending {
            return Err(self.transition_error(ItemStatus::InProgress));
        }
        self.status = ItemStatus::InProgress;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// in_progress -> completed
    pub fn mark_completed(&mut self, path: impl Into<String>) -> Result<(), PlanError> {
        if self.status != ItemStatus::InProgress {
            return Err(self.transition_error(ItemStatus::Completed));
        }
        self.status = ItemStatus::Completed;
        self.file_path = Some(path.into());
        self.progress = 1.0;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// in_progress -> failed
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), PlanError> {
        if self.status != ItemStatus::InProgress {
            return Err(self.transition_error(ItemStatus::Failed));
        }
        self.status = ItemStatus::Failed;
        self.error = reason.into();
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// {pending, in_progress} -> skipped (the optimizer runs before
    /// dispatch, so skip is observed from pending; a defensive allowance
    /// for in_progress keeps this usable from rollup recomputation too).
    pub fn mark_skipped(&mut self, path: impl Into<String>) -> Result<(), PlanError> {
        if self.status.is_terminal() {
            return Err(self.transition_error(ItemStatus::Skipped));
        }
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.status = ItemStatus::Skipped;
        self.file_path = Some(path.into());
        self.progress = 1.0;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Recompute a container's own status/progress from a snapshot of its
    /// children's statuses. Used by the Executor's rollup pass (§4.E);
    /// never called directly on a track item.
    pub fn recompute_container(&mut self, child_statuses: &[ItemStatus], failed_count: usize) {
        if child_statuses.is_empty() {
            self.status = ItemStatus::Failed;
            self.error = "no child items".to_string();
            self.completed_at = Some(Utc::now());
            return;
        }
        let total = child_statuses.len();
        let completed = child_statuses
            .iter()
            .filter(|s| **s == ItemStatus::Completed)
            .count();
        let skipped = child_statuses
            .iter()
            .filter(|s| **s == ItemStatus::Skipped)
            .count();
        let pending_or_running = child_statuses
            .iter()
            .filter(|s| matches!(s, ItemStatus::Pending | ItemStatus::InProgress))
            .count();

        if completed + skipped == total {
            self.status = ItemStatus::Completed;
            self.progress = 1.0;
            self.completed_at = Some(Utc::now());
        } else if failed_count > 0 && pending_or_running == 0 {
            self.status = ItemStatus::Failed;
            self.error = format!(
                "{failed_count} of {total} failed ({completed} completed, {skipped} skipped)"
            );
            self.completed_at = Some(Utc::now());
        } else {
            self.status = ItemStatus::InProgress;
            self.progress = (completed + skipped) as f64 / total as f64;
            if self.started_at.is_none() {
                self.started_at = Some(Utc::now());
            }
        }
    }

    /// Reset path used exclusively by `DownloadService::reset` (§4.F).
    pub fn reset_to_pending(&mut self) {
        self.status = ItemStatus::Pending;
        self.error.clear();
        self.file_path = None;
        self.progress = 0.0;
        self.started_at = None;
        self.completed_at = None;
    }

    /// On-load normalization: the on-disk schema has no concept of
    /// in-progress across restarts (§4.F resumption correctness).
    pub fn demote_in_progress_on_load(&mut self) {
        if self.status == ItemStatus::InProgress {
            self.status = ItemStatus::Pending;
            self.started_at = None;
        }
    }
}
