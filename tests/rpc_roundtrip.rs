//! Exercises the worker-side RPC server against the real client over a
//! loopback TCP connection, including the version-mismatch scenario.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use cratedigger::catalog::{
    CatalogAlbumRef, CatalogError, CatalogPage, CatalogProvider, CatalogResource, CatalogTrack,
    DownloadOutcome, Downloader,
};
use cratedigger::config::{ConfigManager, Configuration, Credentials};
use cratedigger::rpc::envelope::{RpcRequest, RpcRequestPayload, RpcResponsePayload, PROTOCOL_VERSION};
use cratedigger::rpc::transport::RpcTransport;
use cratedigger::rpc::{RpcClient, RpcServer, WorkerHandler};
use cratedigger::service::DownloadService;
use cratedigger::utils::FileExistenceCache;

struct NoopCatalog;

#[async_trait]
impl CatalogProvider for NoopCatalog {
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

struct NoopDownloader;

#[async_trait]
impl Downloader for NoopDownloader {
    async fn download(&self, _item: &cratedigger::plan::PlanItem, _cancel: CancellationToken) -> DownloadOutcome {
        DownloadOutcome {
            ok: false,
            path: None,
            error: Some("unused".to_string()),
        }
    }
}

fn sample_config() -> Configuration {
    Configuration {
        version: "v1.0.0".to_string(),
        credentials: Credentials {
            username: "u".to_string(),
            password: String::new(),
            token: None,
        },
        threads: 1,
        output_format: Default::default(),
        bitrate_kbps: 320,
        provider_preference: Vec::new(),
        overwrite_policy: Default::default(),
        cache: Default::default(),
        rate_limit: Default::default(),
        retry: Default::default(),
        advanced: Default::default(),
        output_directory: "/tmp/cratedigger-rpc-test".to_string(),
        songs: Vec::new(),
        albums: Vec::new(),
        artists: Vec::new(),
        playlists: Vec::new(),
    }
}

async fn spawn_server(plan_dir: std::path::PathBuf, log_path: std::path::PathBuf) -> (u16, CancellationToken) {
    let config_manager = Arc::new(ConfigManager::from_configuration(
        sample_config(),
        plan_dir.join("config.toml"),
    ));
    let service = DownloadService::new(
        config_manager.clone(),
        Arc::new(NoopCatalog),
        Arc::new(NoopDownloader),
        Arc::new(FileExistenceCache::new(16, Duration::from_secs(30))),
        plan_dir,
        true,
    );
    let handler = Arc::new(WorkerHandler::new(service, config_manager));
    let server = RpcServer::new(handler, log_path.to_string_lossy().into_owned());

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let shutdown = CancellationToken::new();
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        server.serve(port, server_shutdown).await.unwrap();
    });
    // give the listener a moment to bind before the client dials.
    tokio::time::sleep(Duration::from_millis(50)).await;
    (port, shutdown)
}

#[tokio::test]
async fn health_check_round_trips_over_real_tcp() {
    let dir = tempfile::tempdir().unwrap();
    let (port, shutdown) = spawn_server(dir.path().to_path_buf(), dir.path().join("log.jsonl")).await;

    let client = RpcClient::new("127.0.0.1", port);
    let (liveness, readiness, health) = client.health_check().await.unwrap();
    assert!(liveness);
    assert!(readiness);
    assert_eq!(health, "healthy");

    shutdown.cancel();
}

#[tokio::test]
async fn get_status_round_trips_before_any_run() {
    let dir = tempfile::tempdir().unwrap();
    let (port, shutdown) = spawn_server(dir.path().to_path_buf(), dir.path().join("log.jsonl")).await;

    let client = RpcClient::new("127.0.0.1", port);
    let status = client.get_status().await.unwrap();
    assert_eq!(status.total_tracks, 0);

    shutdown.cancel();
}

#[tokio::test]
async fn mismatched_client_version_gets_version_mismatch_response() {
    let dir = tempfile::tempdir().unwrap();
    let (port, shutdown) = spawn_server(dir.path().to_path_buf(), dir.path().join("log.jsonl")).await;

    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut transport = RpcTransport::new(stream);
    let mut request = RpcRequest::new(RpcRequestPayload::HealthCheck);
    request.version = "v9.9.9".to_string();
    transport.send(&request).await.unwrap();

    let response: cratedigger::rpc::envelope::RpcResponse = transport.recv().await.unwrap();
    match response.payload {
        RpcResponsePayload::VersionMismatch { server_version } => {
            assert_eq!(server_version, PROTOCOL_VERSION);
        }
        other => panic!("expected VersionMismatch, got {other:?}"),
    }

    shutdown.cancel();
}
