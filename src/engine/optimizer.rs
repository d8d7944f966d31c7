//! [MODULE D] Optimizer — marks items skippable when the target file
//! already exists; the sole source of skip decisions (§4.D).

use std::path::PathBuf;

use crate::config::{Configuration, OverwritePolicy};
use crate::plan::{DownloadPlan, ItemStatus, ItemType};
use crate::utils::file_cache::FileExistenceCache;
use crate::utils::m3u::sanitize_name;

pub struct Optimizer<'a> {
    config: &'a Configuration,
    cache: &'a FileExistenceCache,
}

impl<'a> Optimizer<'a> {
    pub fn new(config: &'a Configuration, cache: &'a FileExistenceCache) -> Self {
        Self { config, cache }
    }

    /// Computes the on-disk target path for a track from configuration and
    /// its metadata (artist/album names, track number) plus the configured
    /// output format's extension.
    pub fn target_path(&self, item: &crate::plan::PlanItem) -> String {
        let artist = item
            .metadata
            .get("artist_name")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown Artist");
        let album = item
            .metadata
            .get("album_name")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown Album");
        let track_number = item
            .metadata
            .get("track_number")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        let extension = self.config.output_format.to_string();
        let filename = format!(
            "{:02} - {}.{}",
            track_number,
            sanitize_name(&item.name),
            extension
        );

        let mut path = PathBuf::from(&self.config.output_directory);
        path.push(sanitize_name(artist));
        path.push(sanitize_name(album));
        path.push(filename);
        path.to_string_lossy().into_owned()
    }

    /// Walks every pending track and applies the overwrite policy (§4.D).
    pub async fn optimize(&self, plan: &DownloadPlan) {
        let tracks = plan.items_by_type(ItemType::Track).await;
        for handle in tracks {
            let mut item = handle.lock().await;
            if item.status != ItemStatus::Pending {
                continue;
            }
            let target = self.target_path(&item);
            match self.config.overwrite_policy {
                OverwritePolicy::Skip => {
                    if self.cache.exists(&target).await {
                        let _ = item.mark_skipped(target);
                    } else {
                        item.metadata.insert(
                            "target_path".to_string(),
                            serde_json::Value::String(target),
                        );
                    }
                }
                OverwritePolicy::Overwrite => {
                    item.metadata.insert(
                        "target_path".to_string(),
                        serde_json::Value::String(target),
                    );
                }
                OverwritePolicy::Error => {
                    if self.cache.exists(&target).await {
                        item.status = ItemStatus::Failed;
                        item.error = "overwrite_policy is 'error' and target file exists".to_string();
                        item.completed_at = Some(chrono::Utc::now());
                    } else {
                        item.metadata.insert(
                            "target_path".to_string(),
                            serde_json::Value::String(target),
                        );
                    }
                }
            }
        }
    }
}
