//! The HTTP/JSON + SSE control plane (§6). Thin handlers delegate to the
//! worker over RPC via `ServiceManager`/`RpcClient`; router assembly
//! follows the teacher's `WebServer::create_router` shape.

pub mod handlers;
pub mod responses;
pub mod sse;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigManager;
use crate::process::ServiceManager;

pub use state::AppState;

pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(
        config_manager: Arc<ConfigManager>,
        service_manager: Arc<ServiceManager>,
        addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> Self {
        let state = AppState::new(config_manager, service_manager);
        state.spawn_status_poller(shutdown);

        let app = Router::new()
            .route("/api/health", get(handlers::health::health))
            .route("/api/health/stats", get(handlers::health::health_stats))
            .route(
                "/api/config",
                get(handlers::config::get_config).put(handlers::config::put_config),
            )
            .route(
                "/api/config/validate",
                axum::routing::post(handlers::config::validate_config),
            )
            .route("/api/config/digest", get(handlers::config::config_digest))
            .route(
                "/api/download/start",
                axum::routing::post(handlers::download::start),
            )
            .route(
                "/api/download/stop",
                axum::routing::post(handlers::download::stop),
            )
            .route(
                "/api/download/reset",
                axum::routing::post(handlers::download::reset),
            )
            .route("/api/download/status", get(handlers::download::status))
            .route("/api/status", get(handlers::status::status))
            .route("/api/status/stream", get(handlers::status::status_stream))
            .route("/api/logs", get(handlers::logs::logs))
            .route("/api/logs/stream", get(handlers::logs::logs_stream))
            .route("/api/plan/items", get(handlers::plan::plan_items))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        Self { app, addr }
    }

    pub async fn serve(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, "control plane listening");
        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    }
}
