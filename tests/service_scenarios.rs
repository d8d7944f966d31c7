//! End-to-end scenarios against `DownloadService`, seeded from the
//! concrete scenarios enumerated for the plan engine: empty plan,
//! already-present skip, resume-after-stop, and reset semantics.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use cratedigger::catalog::{
    CatalogAlbumRef, CatalogError, CatalogPage, CatalogProvider, CatalogResource, CatalogTrack,
    DownloadOutcome, Downloader,
};
use cratedigger::config::{ConfigManager, Configuration, Credentials, OverwritePolicy, SourceEntry};
use cratedigger::service::state::{ServicePhase, ServiceRunState};
use cratedigger::service::DownloadService;
use cratedigger::utils::FileExistenceCache;

struct SingleTrackCatalog;

#[async_trait]
impl CatalogProvider for SingleTrackCatalog {
    async fn resolve(&self, url: &str) -> Result<CatalogResource, CatalogError> {
        Ok(CatalogResource::Track(CatalogTrack {
            source_id: "x1".to_string(),
            title: "Only Song".to_string(),
            url: Some(url.to_string()),
            alt_url: None,
            track_number: 1,
            disc_number: 1,
            artist_name: "Artist".to_string(),
            album_name: "Album".to_string(),
            cover_url: None,
            explicit: false,
        }))
    }

    async fn album_tracks(&self, _id: &str) -> Result<Vec<CatalogTrack>, CatalogError> {
        Ok(Vec::new())
    }

    async fn artist_albums(&self, _id: &str) -> Result<Vec<CatalogAlbumRef>, CatalogError> {
        Ok(Vec::new())
    }

    async fn playlist_page(
        &self,
        _id: &str,
        _cursor: Option<&str>,
    ) -> Result<CatalogPage, CatalogError> {
        Ok(CatalogPage {
            tracks: Vec::new(),
            next_cursor: None,
        })
    }
}

struct MultiTrackCatalog;

#[async_trait]
impl CatalogProvider for MultiTrackCatalog {
    async fn resolve(&self, url: &str) -> Result<CatalogResource, CatalogError> {
        let (source_id, title) = match url {
            "https://example.invalid/track/x1" => ("x1", "Track 1"),
            "https://example.invalid/track/x2" => ("x2", "Track 2"),
            "https://example.invalid/track/x3" => ("x3", "Track 3"),
            other => return Err(CatalogError::NotFound(other.to_string())),
        };
        Ok(CatalogResource::Track(CatalogTrack {
            source_id: source_id.to_string(),
            title: title.to_string(),
            url: Some(url.to_string()),
            alt_url: None,
            track_number: 1,
            disc_number: 1,
            artist_name: "Artist".to_string(),
            album_name: "Album".to_string(),
            cover_url: None,
            explicit: false,
        }))
    }

    async fn album_tracks(&self, _id: &str) -> Result<Vec<CatalogTrack>, CatalogError> {
        Ok(Vec::new())
    }

    async fn artist_albums(&self, _id: &str) -> Result<Vec<CatalogAlbumRef>, CatalogError> {
        Ok(Vec::new())
    }

    async fn playlist_page(
        &self,
        _id: &str,
        _cursor: Option<&str>,
    ) -> Result<CatalogPage, CatalogError> {
        Ok(CatalogPage {
            tracks: Vec::new(),
            next_cursor: None,
        })
    }
}

struct EmptyCatalog;

#[async_trait]
impl CatalogProvider for EmptyCatalog {
    async fn resolve(&self, url: &str) -> Result<CatalogResource, CatalogError> {
        Err(CatalogError::NotFound(url.to_string()))
    }
    async fn album_tracks(&self, _id: &str) -> Result<Vec<CatalogTrack>, CatalogError> {
        Ok(Vec::new())
    }
    async fn artist_albums(&self, _id: &str) -> Result<Vec<CatalogAlbumRef>, CatalogError> {
        Ok(Vec::new())
    }
    async fn playlist_page(
        &self,
        _id: &str,
        _cursor: Option<&str>,
    ) -> Result<CatalogPage, CatalogError> {
        Ok(CatalogPage {
            tracks: Vec::new(),
            next_cursor: None,
        })
    }
}

struct AlwaysSucceeds;

#[async_trait]
impl Downloader for AlwaysSucceeds {
    async fn download(&self, item: &cratedigger::plan::PlanItem, _cancel: CancellationToken) -> DownloadOutcome {
        // A small delay so tests racing a second `start()` against an
        // in-flight one observe the Executing phase rather than a run
        // that finished within the same scheduler tick.
        tokio::time::sleep(Duration::from_millis(100)).await;
        DownloadOutcome {
            ok: true,
            path: Some(format!("/tmp/does-not-matter/{}.mp3", item.source_id)),
            error: None,
        }
    }
}

/// Blocks "Track 1" on a caller-controlled `Notify` so a test can call
/// `stop()` with a known track still mid-download; the other tracks
/// complete immediately once dispatched.
struct GatesFirstTrack {
    notify: Arc<tokio::sync::Notify>,
}

#[async_trait]
impl Downloader for GatesFirstTrack {
    async fn download(&self, item: &cratedigger::plan::PlanItem, _cancel: CancellationToken) -> DownloadOutcome {
        if item.name == "Track 1" {
            self.notify.notified().await;
        }
        DownloadOutcome {
            ok: true,
            path: Some(format!("/tmp/does-not-matter/{}.mp3", item.source_id)),
            error: None,
        }
    }
}

struct NeverCalled;

#[async_trait]
impl Downloader for NeverCalled {
    async fn download(&self, _item: &cratedigger::plan::PlanItem, _cancel: CancellationToken) -> DownloadOutcome {
        panic!("downloader should not run for an already-satisfied track");
    }
}

fn base_config(output_directory: String) -> Configuration {
    Configuration {
        version: "v1.0.0".to_string(),
        credentials: Credentials {
            username: "user".to_string(),
            password: String::new(),
            token: None,
        },
        threads: 2,
        output_format: Default::default(),
        bitrate_kbps: 320,
        provider_preference: Vec::new(),
        overwrite_policy: OverwritePolicy::Skip,
        cache: Default::default(),
        rate_limit: Default::default(),
        retry: Default::default(),
        advanced: Default::default(),
        output_directory,
        songs: Vec::new(),
        albums: Vec::new(),
        artists: Vec::new(),
        playlists: Vec::new(),
    }
}

async fn wait_for_terminal(service: &Arc<DownloadService>) {
    for _ in 0..200 {
        let phase = service.phase().await;
        if matches!(
            phase,
            ServicePhase::Completed | ServicePhase::Error | ServicePhase::Idle
        ) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("service did not reach a terminal phase in time");
}

#[tokio::test]
async fn empty_plan_completes_with_zero_stats() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config(dir.path().to_string_lossy().into_owned());
    let config_manager = Arc::new(ConfigManager::from_configuration(
        config,
        dir.path().join("config.toml"),
    ));
    let service = DownloadService::new(
        config_manager,
        Arc::new(EmptyCatalog),
        Arc::new(NeverCalled),
        Arc::new(FileExistenceCache::new(16, Duration::from_secs(30))),
        dir.path().to_path_buf(),
        true,
    );

    service.start().await.unwrap();
    wait_for_terminal(&service).await;

    let status = service.status().await;
    assert_eq!(status.state, ServiceRunState::Idle);
    assert_eq!(status.total_tracks, 0);
    assert_eq!(status.completed, 0);
    assert_eq!(status.failed, 0);
}

#[tokio::test]
async fn single_track_already_present_is_skipped_without_downloading() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path().to_string_lossy().into_owned());
    config.songs.push(SourceEntry {
        name: "Only Song".to_string(),
        url: "https://example.invalid/track/x1".to_string(),
        create_m3u: false,
    });

    let target = Path::new(&config.output_directory)
        .join("Artist")
        .join("Album")
        .join("01 - Only Song.mp3");
    tokio::fs::create_dir_all(target.parent().unwrap()).await.unwrap();
    tokio::fs::write(&target, b"already here").await.unwrap();

    let config_manager = Arc::new(ConfigManager::from_configuration(
        config,
        dir.path().join("config.toml"),
    ));
    let service = DownloadService::new(
        config_manager,
        Arc::new(SingleTrackCatalog),
        Arc::new(NeverCalled),
        Arc::new(FileExistenceCache::new(16, Duration::from_secs(30))),
        dir.path().to_path_buf(),
        true,
    );

    service.start().await.unwrap();
    wait_for_terminal(&service).await;

    let status = service.status().await;
    assert_eq!(status.total_tracks, 1);
    assert_eq!(status.skipped, 1);
    assert_eq!(status.completed, 0);
}

#[tokio::test]
async fn start_while_running_is_rejected_and_does_not_perturb_the_plan() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path().to_string_lossy().into_owned());
    config.songs.push(SourceEntry {
        name: "Only Song".to_string(),
        url: "https://example.invalid/track/x1".to_string(),
        create_m3u: false,
    });
    let config_manager = Arc::new(ConfigManager::from_configuration(
        config,
        dir.path().join("config.toml"),
    ));
    let service = DownloadService::new(
        config_manager,
        Arc::new(SingleTrackCatalog),
        Arc::new(AlwaysSucceeds),
        Arc::new(FileExistenceCache::new(16, Duration::from_secs(30))),
        dir.path().to_path_buf(),
        true,
    );

    service.start().await.unwrap();
    let second_start = service.start().await;
    assert!(second_start.is_err(), "Start while running must be rejected");

    wait_for_terminal(&service).await;
    let status = service.status().await;
    assert_eq!(status.completed, 1);
}

#[tokio::test]
async fn reset_clears_persisted_plan_and_returns_to_idle() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path().to_string_lossy().into_owned());
    config.songs.push(SourceEntry {
        name: "Only Song".to_string(),
        url: "https://example.invalid/track/x1".to_string(),
        create_m3u: false,
    });
    let config_manager = Arc::new(ConfigManager::from_configuration(
        config,
        dir.path().join("config.toml"),
    ));
    let service = DownloadService::new(
        config_manager,
        Arc::new(SingleTrackCatalog),
        Arc::new(AlwaysSucceeds),
        Arc::new(FileExistenceCache::new(16, Duration::from_secs(30))),
        dir.path().to_path_buf(),
        true,
    );

    service.start().await.unwrap();
    wait_for_terminal(&service).await;
    assert!(tokio::fs::try_exists(dir.path().join("download_plan_progress.json")).await.unwrap());

    service.reset().await.unwrap();
    assert_eq!(service.phase().await, ServicePhase::Idle);
    assert!(service.plan().await.is_none());
    assert!(!tokio::fs::try_exists(dir.path().join("download_plan_progress.json")).await.unwrap());
}

#[tokio::test]
async fn reset_discards_pending_config_without_applying_it() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path().to_string_lossy().into_owned());
    config.songs.push(SourceEntry {
        name: "Only Song".to_string(),
        url: "https://example.invalid/track/x1".to_string(),
        create_m3u: false,
    });
    let original_threads = config.threads;
    let config_manager = Arc::new(ConfigManager::from_configuration(
        config,
        dir.path().join("config.toml"),
    ));
    let service = DownloadService::new(
        config_manager.clone(),
        Arc::new(SingleTrackCatalog),
        Arc::new(AlwaysSucceeds),
        Arc::new(FileExistenceCache::new(16, Duration::from_secs(30))),
        dir.path().to_path_buf(),
        true,
    );

    service.start().await.unwrap();
    wait_for_terminal(&service).await;

    let mut replacement = config_manager.active().await;
    replacement.threads = original_threads + 1;
    config_manager.queue_update(replacement).await.unwrap();
    assert!(config_manager.has_pending().await);

    service.reset().await.unwrap();

    assert!(
        !config_manager.has_pending().await,
        "reset must discard the queued update"
    );
    assert_eq!(
        config_manager.active().await.threads,
        original_threads,
        "reset must not promote the discarded update to active"
    );
}

#[tokio::test]
async fn resume_after_stop_completes_remaining_tracks() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path().to_string_lossy().into_owned());
    config.threads = 1;
    for url in [
        "https://example.invalid/track/x1",
        "https://example.invalid/track/x2",
        "https://example.invalid/track/x3",
    ] {
        config.songs.push(SourceEntry {
            name: url.to_string(),
            url: url.to_string(),
            create_m3u: false,
        });
    }
    let config_manager = Arc::new(ConfigManager::from_configuration(
        config,
        dir.path().join("config.toml"),
    ));
    let notify = Arc::new(tokio::sync::Notify::new());
    let service = DownloadService::new(
        config_manager,
        Arc::new(MultiTrackCatalog),
        Arc::new(GatesFirstTrack {
            notify: notify.clone(),
        }),
        Arc::new(FileExistenceCache::new(16, Duration::from_secs(30))),
        dir.path().to_path_buf(),
        true,
    );

    service.start().await.unwrap();

    for _ in 0..200 {
        if service.status().await.in_progress >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        service.status().await.in_progress,
        1,
        "Track 1 must be mid-download before stop is called"
    );

    let release = notify.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        release.notify_one();
    });
    service.stop().await.unwrap();
    assert_eq!(service.phase().await, ServicePhase::Idle);

    let status = service.status().await;
    assert_eq!(
        status.completed, 2,
        "tracks already dispatched before stop must finish, the rest stay pending"
    );
    assert_eq!(status.total_tracks, 3);

    service.start().await.unwrap();
    wait_for_terminal(&service).await;

    let status = service.status().await;
    assert_eq!(status.completed, status.total_tracks);
    assert_eq!(status.failed, 0);
}
