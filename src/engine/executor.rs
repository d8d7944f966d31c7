//! [MODULE E] Executor — bounded-parallel execution of track items, the
//! container rollup post-pass, and M3U emission (§4.E).

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::Downloader;
use crate::config::Configuration;
use crate::plan::{DownloadPlan, ItemStatus, ItemType, PlanItem};
use crate::utils::m3u::resolve_collision_free_path;

pub type ProgressCallback = Arc<dyn Fn(&PlanItem) + Send + Sync>;

/// Owns `Arc`s rather than borrows so `execute` can be spawned as a
/// `'static` background task, per §4.F step 3 ("spawn executor in a
/// background task").
#[derive(Clone)]
pub struct Executor {
    config: Arc<Configuration>,
    downloader: Arc<dyn Downloader>,
    shutdown: CancellationToken,
    on_progress: ProgressCallback,
}

impl Executor {
    pub fn new(
        config: Arc<Configuration>,
        downloader: Arc<dyn Downloader>,
        shutdown: CancellationToken,
        on_progress: ProgressCallback,
    ) -> Self {
        Self {
            config,
            downloader,
            shutdown,
            on_progress,
        }
    }

    /// Cooperative cancellation: already-dispatched tasks run to
    /// completion; no new tasks are dispatched (§4.E "Cancellation").
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Runs every pending track through the worker pool, then the
    /// container rollup pass, then M3U emission, then rollup again. With
    /// `threads == 1` tasks are dispatched one at a time in plan order, so
    /// completion order matches the plan's item order (§4.E
    /// "Determinism"). The rollup pass runs twice because a container
    /// with `create_m3u: true` has a pending `m3u` child at the time of
    /// the first pass; without a second pass after M3U emission that
    /// child stays pending forever and the container never leaves
    /// `InProgress`.
    pub async fn execute(&self, plan: &DownloadPlan) {
        self.run_tracks(plan).await;
        self.rollup_containers(plan).await;
        self.generate_m3u_files(plan).await;
        self.rollup_containers(plan).await;
    }

    async fn run_tracks(&self, plan: &DownloadPlan) {
        let permits = self.config.threads.max(1) as usize;
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut handles = Vec::new();

        for id in plan.item_ids() {
            if self.shutdown.is_cancelled() {
                break;
            }
            let Some(item_handle) = plan.get_item(id) else {
                continue;
            };
            let is_pending_track = {
                let item = item_handle.lock().await;
                item.item_type == ItemType::Track && item.status == ItemStatus::Pending
            };
            if !is_pending_track {
                continue;
            }

            let semaphore = semaphore.clone();
            let shutdown = self.shutdown.clone();
            let on_progress = self.on_progress.clone();
            let downloader = self.downloader.clone();

            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let task = async move {
                let _permit = permit;
                Self::run_one_track(item_handle, downloader, shutdown, on_progress).await;
            };
            handles.push(tokio::spawn(task));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "track task panicked");
            }
        }
    }

    async fn run_one_track(
        item_handle: Arc<tokio::sync::Mutex<PlanItem>>,
        downloader: Arc<dyn Downloader>,
        shutdown: CancellationToken,
        on_progress: ProgressCallback,
    ) {
        {
            let mut item = item_handle.lock().await;
            if item.mark_started().is_err() {
                return;
            }
            on_progress(&item);
        }

        let missing_urls = {
            let item = item_handle.lock().await;
            item.source_url.is_none() && item.alt_url.is_none()
        };

        if missing_urls {
            let mut item = item_handle.lock().await;
            let _ = item.mark_failed("item has neither source_url nor alt_url");
            on_progress(&item);
            return;
        }

        let outcome = {
            let item = item_handle.lock().await;
            downloader.download(&item, shutdown).await
        };

        let mut item = item_handle.lock().await;
        if let Some(error) = outcome.error {
            let _ = item.mark_failed(error);
        } else if outcome.ok {
            match outcome.path {
                Some(path) => {
                    let _ = item.mark_completed(path);
                }
                None => {
                    let _ = item.mark_failed("download returned failure");
                }
            }
        } else {
            let _ = item.mark_failed("download returned failure");
        }
        on_progress(&item);
    }

    /// Bottom-up container rollup (§4.E). `plan.item_ids()` preserves
    /// generation order, which is always parent-before-child, so iterating
    /// in reverse visits every container after all of its descendants.
    async fn rollup_containers(&self, plan: &DownloadPlan) {
        for id in plan.item_ids().iter().rev() {
            let Some(handle) = plan.get_item(id) else {
                continue;
            };
            let (item_type, child_ids) = {
                let item = handle.lock().await;
                (item.item_type, item.child_ids.clone())
            };
            if matches!(item_type, ItemType::Track | ItemType::M3u) {
                continue;
            }

            let mut child_statuses = Vec::with_capacity(child_ids.len());
            let mut failed_count = 0usize;
            for child_id in &child_ids {
                if let Some(child_handle) = plan.get_item(child_id) {
                    let status = child_handle.lock().await.status;
                    if status == ItemStatus::Failed {
                        failed_count += 1;
                    }
                    child_statuses.push(status);
                }
            }

            let mut item = handle.lock().await;
            item.recompute_container(&child_statuses, failed_count);
        }
    }

    /// Writes one M3U file per pending `m3u` item from its parent's direct
    /// track children (§4.E "M3U generation rule").
    async fn generate_m3u_files(&self, plan: &DownloadPlan) {
        let m3u_handles = plan.items_by_type(ItemType::M3u).await;
        for handle in m3u_handles {
            let (parent_id, display_name, is_pending) = {
                let item = handle.lock().await;
                (item.parent_id.clone(), item.name.clone(), item.status == ItemStatus::Pending)
            };
            if !is_pending {
                continue;
            }
            {
                let mut item = handle.lock().await;
                let _ = item.mark_started();
            }

            let Some(parent_handle) = plan.get_item(&parent_id) else {
                let mut item = handle.lock().await;
                let _ = item.mark_failed("parent container not found");
                continue;
            };
            let child_ids = parent_handle.lock().await.child_ids.clone();

            let mut lines = Vec::new();
            for child_id in &child_ids {
                let Some(child_handle) = plan.get_item(child_id) else {
                    continue;
                };
                let child = child_handle.lock().await;
                if child.item_type != ItemType::Track {
                    continue;
                }
                if !matches!(child.status, ItemStatus::Completed | ItemStatus::Skipped) {
                    continue;
                }
                let Some(path) = &child.file_path else {
                    continue;
                };
                if !tokio::fs::try_exists(Path::new(path)).await.unwrap_or(false) {
                    continue;
                }
                lines.push((child.name.clone(), path.clone()));
            }

            if lines.is_empty() {
                let mut item = handle.lock().await;
                let _ = item.mark_failed("no qualifying tracks for m3u");
                continue;
            }

            let dir = Path::new(&self.config.output_directory);
            let Some(m3u_path) = resolve_collision_free_path(dir, &display_name).await else {
                let mut item = handle.lock().await;
                let _ = item.mark_failed("could not find a non-colliding m3u filename");
                continue;
            };

            let mut body = String::from("#EXTM3U\n");
            for (title, path) in &lines {
                body.push_str(&format!("#EXTINF:-1,{title}\n{path}\n"));
            }

            match tokio::fs::write(&m3u_path, body.as_bytes()).await {
                Ok(()) => {
                    let mut item = handle.lock().await;
                    let _ = item.mark_completed(m3u_path.to_string_lossy().into_owned());
                    info!(path = %m3u_path.display(), "wrote m3u playlist");
                }
                Err(e) => {
                    let mut item = handle.lock().await;
                    let _ = item.mark_failed(format!("failed to write m3u file: {e}"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DownloadOutcome;
    use crate::config::{Credentials, SourceEntry};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailsByName {
        fail_name: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Downloader for FailsByName {
        async fn download(&self, item: &PlanItem, _cancel: CancellationToken) -> DownloadOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if item.name == self.fail_name {
                DownloadOutcome {
                    ok: false,
                    path: None,
                    error: Some("network".to_string()),
                }
            } else {
                DownloadOutcome {
                    ok: true,
                    path: Some(format!("/music/{}.mp3", item.name)),
                    error: None,
                }
            }
        }
    }

    fn config() -> Configuration {
        config_with_output_dir("/music")
    }

    fn config_with_output_dir(output_directory: impl Into<String>) -> Configuration {
        Configuration {
            version: "v1.0.0".to_string(),
            credentials: Credentials {
                username: "u".to_string(),
                password: String::new(),
                token: None,
            },
            threads: 2,
            output_format: Default::default(),
            bitrate_kbps: 320,
            provider_preference: Vec::new(),
            overwrite_policy: Default::default(),
            cache: Default::default(),
            rate_limit: Default::default(),
            retry: Default::default(),
            advanced: Default::default(),
            output_directory: output_directory.into(),
            songs: vec![SourceEntry {
                name: "x".to_string(),
                url: "https://example.invalid".to_string(),
                create_m3u: false,
            }],
            albums: Vec::new(),
            artists: Vec::new(),
            playlists: Vec::new(),
        }
    }

    struct WritesRealFiles {
        dir: std::path::PathBuf,
    }

    #[async_trait]
    impl Downloader for WritesRealFiles {
        async fn download(&self, item: &PlanItem, _cancel: CancellationToken) -> DownloadOutcome {
            let path = self.dir.join(format!("{}.mp3", item.name));
            tokio::fs::write(&path, b"data").await.unwrap();
            DownloadOutcome {
                ok: true,
                path: Some(path.to_string_lossy().into_owned()),
                error: None,
            }
        }
    }

    fn playlist_of_three() -> DownloadPlan {
        let mut plan = DownloadPlan::new();
        let mut playlist = PlanItem::new(ItemType::Playlist, "pl1", "Playlist");
        let mut tracks = Vec::new();
        for i in 1..=3 {
            let mut track = PlanItem::new(ItemType::Track, format!("t{i}"), format!("Track {i}"));
            track.source_url = Some(format!("https://example.invalid/track/t{i}"));
            track.parent_id = playlist.item_id.clone();
            playlist.child_ids.push(track.item_id.clone());
            tracks.push(track);
        }
        plan.add_item(playlist).unwrap();
        for track in tracks {
            plan.add_item(track).unwrap();
        }
        plan
    }

    /// Mirrors `Generator::add_m3u_sibling`: a playlist with two tracks and
    /// an `m3u` sibling child wired into the same `child_ids` list.
    fn playlist_with_m3u_sibling() -> DownloadPlan {
        let mut plan = DownloadPlan::new();
        let mut playlist = PlanItem::new(ItemType::Playlist, "pl1", "Playlist");
        let mut tracks = Vec::new();
        for i in 1..=2 {
            let mut track = PlanItem::new(ItemType::Track, format!("t{i}"), format!("Track {i}"));
            track.source_url = Some(format!("https://example.invalid/track/t{i}"));
            track.parent_id = playlist.item_id.clone();
            playlist.child_ids.push(track.item_id.clone());
            tracks.push(track);
        }
        let mut m3u_item = PlanItem::new(ItemType::M3u, "pl1-m3u", "Playlist");
        m3u_item.parent_id = playlist.item_id.clone();
        playlist.child_ids.push(m3u_item.item_id.clone());

        plan.add_item(playlist).unwrap();
        for track in tracks {
            plan.add_item(track).unwrap();
        }
        plan.add_item(m3u_item).unwrap();
        plan
    }

    #[tokio::test]
    async fn container_with_m3u_child_reaches_completed_after_second_rollup() {
        let dir = tempfile::tempdir().unwrap();
        let downloader: Arc<dyn Downloader> = Arc::new(WritesRealFiles {
            dir: dir.path().to_path_buf(),
        });
        let executor = Executor::new(
            Arc::new(config_with_output_dir(dir.path().to_string_lossy().into_owned())),
            downloader,
            CancellationToken::new(),
            Arc::new(|_| {}),
        );
        let plan = playlist_with_m3u_sibling();
        executor.execute(&plan).await;

        let m3u = plan.get_item("m3u:pl1-m3u").unwrap();
        assert_eq!(m3u.lock().await.status, ItemStatus::Completed);

        let playlist = plan.get_item("playlist:pl1").unwrap();
        let playlist = playlist.lock().await;
        assert_eq!(
            playlist.status,
            ItemStatus::Completed,
            "container must leave InProgress once its m3u sibling resolves"
        );
    }

    #[tokio::test]
    async fn empty_plan_executes_without_error() {
        let downloader: Arc<dyn Downloader> = Arc::new(FailsByName {
            fail_name: "nothing",
            calls: AtomicUsize::new(0),
        });
        let executor = Executor::new(
            Arc::new(config()),
            downloader,
            CancellationToken::new(),
            Arc::new(|_| {}),
        );
        let plan = DownloadPlan::new();
        executor.execute(&plan).await;
        assert_eq!(plan.get_execution_statistics().await.total, 0);
    }

    #[tokio::test]
    async fn playlist_of_three_one_fails_rolls_up_with_counts() {
        let downloader: Arc<dyn Downloader> = Arc::new(FailsByName {
            fail_name: "Track 2",
            calls: AtomicUsize::new(0),
        });
        let executor = Executor::new(
            Arc::new(config()),
            downloader,
            CancellationToken::new(),
            Arc::new(|_| {}),
        );
        let plan = playlist_of_three();
        executor.execute(&plan).await;

        let stats = plan.get_execution_statistics().await;
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);

        let playlist = plan.get_item("playlist:pl1").unwrap();
        let playlist = playlist.lock().await;
        assert_eq!(playlist.status, ItemStatus::Failed);
        assert_eq!(playlist.error, "1 of 3 failed (2 completed, 0 skipped)");
    }

    #[tokio::test]
    async fn no_track_is_left_in_progress_after_execute() {
        let downloader: Arc<dyn Downloader> = Arc::new(FailsByName {
            fail_name: "nothing",
            calls: AtomicUsize::new(0),
        });
        let executor = Executor::new(
            Arc::new(config()),
            downloader,
            CancellationToken::new(),
            Arc::new(|_| {}),
        );
        let plan = playlist_of_three();
        executor.execute(&plan).await;

        for id in plan.item_ids() {
            let handle = plan.get_item(id).unwrap();
            assert_ne!(handle.lock().await.status, ItemStatus::InProgress);
        }
    }
}
