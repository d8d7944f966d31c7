//! Binary entrypoint: four subcommands over the one executable (§1, §6).
//! `serve` runs the HTTP/SSE control plane and lazily supervises the worker
//! subprocess; `download-service` is that worker, listening for RPC;
//! `download` runs the plan engine directly in-process for local/CI use
//! without a control plane at all; `version` prints the protocol version
//! the binary speaks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cratedigger::catalog::{
    CatalogError, CatalogPage, CatalogProvider, CatalogResource, DownloadOutcome, Downloader,
};
use cratedigger::config::ConfigManager;
use cratedigger::process::{ServiceContext, ServiceManager};
use cratedigger::rpc::{RpcServer, WorkerHandler, PROTOCOL_VERSION};
use cratedigger::service::DownloadService;
use cratedigger::utils::{FileExistenceCache, JsonFileLogLayer};
use cratedigger::web::WebServer;

#[derive(Parser)]
#[command(name = "cratedigger")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A two-process music acquisition pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file path.
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Log level filter (overridden by RUST_LOG if set).
    #[arg(short = 'v', long, default_value = "info", global = true)]
    log_level: String,

    /// Directory holding the persisted plan and progress files.
    #[arg(long, default_value = ".", global = true)]
    plan_dir: PathBuf,

    /// JSON-lines log file the worker's tracing events are appended to.
    #[arg(long, default_value = "cratedigger.log.jsonl", global = true)]
    log_file: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP/SSE control plane, supervising the worker on demand.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
        #[arg(long, default_value_t = 9090)]
        worker_port: u16,
        #[arg(long, default_value = "cratedigger-worker.pid")]
        pid_file: PathBuf,
    },
    /// Run the download worker's RPC server (normally spawned by `serve`).
    DownloadService {
        #[arg(long, default_value_t = 9090)]
        port: u16,
    },
    /// Run the plan engine in-process, with no RPC or HTTP surface.
    Download,
    /// Print the RPC protocol version this binary speaks.
    Version,
}

fn init_tracing(log_level: &str, log_file: &PathBuf, service: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("cratedigger={log_level}").into());
    let file_layer = JsonFileLogLayer::new(log_file, service)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Version => {
            println!("cratedigger {}", env!("CARGO_PKG_VERSION"));
            println!("rpc protocol {PROTOCOL_VERSION}");
            Ok(())
        }
        Command::Serve {
            addr,
            worker_port,
            pid_file,
        } => run_serve(&cli.config, &cli.log_level, addr, worker_port, pid_file).await,
        Command::DownloadService { port } => {
            run_download_service(&cli.config, &cli.log_level, &cli.plan_dir, &cli.log_file, port)
                .await
        }
        Command::Download => {
            run_download(&cli.config, &cli.log_level, &cli.plan_dir, &cli.log_file).await
        }
    }
}

async fn run_serve(
    config_path: &str,
    log_level: &str,
    addr: SocketAddr,
    worker_port: u16,
    pid_file: PathBuf,
) -> Result<()> {
    init_tracing(
        log_level,
        &PathBuf::from("cratedigger.control.log.jsonl"),
        "control-plane",
    )?;
    info!("starting cratedigger control plane v{}", env!("CARGO_PKG_VERSION"));

    let config_manager = Arc::new(
        ConfigManager::load_from_file(config_path)
            .with_context(|| format!("failed to load configuration from {config_path}"))?,
    );

    let current_exe = std::env::current_exe().context("failed to resolve own executable path")?;
    let service_manager = Arc::new(ServiceManager::new(ServiceContext {
        worker_binary: current_exe,
        control_port: worker_port,
        pid_file,
        extra_args: vec!["--config".to_string(), config_path.to_string()],
    }));

    let shutdown = CancellationToken::new();
    let web_server = WebServer::new(config_manager, service_manager.clone(), addr, shutdown.clone());

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        signal_shutdown.cancel();
    });

    web_server.serve(shutdown).await.context("control plane server failed")?;
    service_manager.stop_service().await.ok();
    Ok(())
}

async fn run_download_service(
    config_path: &str,
    log_level: &str,
    plan_dir: &std::path::Path,
    log_file: &PathBuf,
    port: u16,
) -> Result<()> {
    init_tracing(log_level, log_file, "download-worker")?;
    info!(port, "starting cratedigger download worker");

    let config_manager = Arc::new(
        ConfigManager::load_from_file(config_path)
            .with_context(|| format!("failed to load configuration from {config_path}"))?,
    );
    let service = build_service(config_manager.clone(), plan_dir).await?;
    let handler = Arc::new(WorkerHandler::new(service, config_manager));
    let server = RpcServer::new(handler, log_file.to_string_lossy().into_owned());

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        signal_shutdown.cancel();
    });

    server.serve(port, shutdown).await.context("rpc server failed")
}

async fn run_download(
    config_path: &str,
    log_level: &str,
    plan_dir: &std::path::Path,
    log_file: &PathBuf,
) -> Result<()> {
    init_tracing(log_level, log_file, "download-cli")?;

    let config_manager = Arc::new(
        ConfigManager::load_from_file(config_path)
            .with_context(|| format!("failed to load configuration from {config_path}"))?,
    );
    let service = build_service(config_manager, plan_dir).await?;
    service.start().await.context("download run failed to start")?;

    loop {
        let status = service.status().await;
        if matches!(
            status.state,
            cratedigger::service::state::ServiceRunState::Idle
                | cratedigger::service::state::ServiceRunState::Error
        ) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    let status = service.status().await;
    info!(
        completed = status.completed,
        failed = status.failed,
        skipped = status.skipped,
        "download run finished"
    );
    Ok(())
}

async fn build_service(
    config_manager: Arc<ConfigManager>,
    plan_dir: &std::path::Path,
) -> Result<Arc<DownloadService>> {
    let catalog: Arc<dyn CatalogProvider> = Arc::new(UnimplementedCatalog);
    let downloader: Arc<dyn Downloader> = Arc::new(UnimplementedDownloader);
    let file_cache = Arc::new(FileExistenceCache::new(10_000, Duration::from_secs(30)));

    Ok(DownloadService::new(
        config_manager,
        catalog,
        downloader,
        file_cache,
        plan_dir.to_path_buf(),
        true,
    ))
}

/// Stand-in for the real streaming-catalog client (§1, §6, §9 — explicitly
/// out of scope). Lets the binary link and run its lifecycle end to end
/// against a real provider supplied at deployment time.
struct UnimplementedCatalog;

#[async_trait::async_trait]
impl CatalogProvider for UnimplementedCatalog {
    async fn resolve(&self, url: &str) -> Result<CatalogResource, CatalogError> {
        Err(CatalogError::Upstream(format!(
            "no catalog provider configured; cannot resolve {url}"
        )))
    }

    async fn album_tracks(
        &self,
        _album_source_id: &str,
    ) -> Result<Vec<cratedigger::catalog::CatalogTrack>, CatalogError> {
        Err(CatalogError::Upstream("no catalog provider configured".to_string()))
    }

    async fn artist_albums(
        &self,
        _artist_source_id: &str,
    ) -> Result<Vec<cratedigger::catalog::CatalogAlbumRef>, CatalogError> {
        Err(CatalogError::Upstream("no catalog provider configured".to_string()))
    }

    async fn playlist_page(
        &self,
        _playlist_source_id: &str,
        _cursor: Option<&str>,
    ) -> Result<CatalogPage, CatalogError> {
        Err(CatalogError::Upstream("no catalog provider configured".to_string()))
    }
}

/// Stand-in for the real audio-acquisition backend (§1, §6, §9 — out of
/// scope); always reports failure so the Executor's retry/rollup paths are
/// exercised the same way they would be against a flaky real backend.
struct UnimplementedDownloader;

#[async_trait::async_trait]
impl Downloader for UnimplementedDownloader {
    async fn download(
        &self,
        _item: &cratedigger::plan::PlanItem,
        _cancel: CancellationToken,
    ) -> DownloadOutcome {
        DownloadOutcome {
            ok: false,
            path: None,
            error: Some("no downloader backend configured".to_string()),
        }
    }
}
