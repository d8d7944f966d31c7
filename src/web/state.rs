//! Shared control-plane state (§2 "Data flow": HTTP handlers reach F
//! through H→I; J reads F periodically and fans out to viewers).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::ConfigManager;
use crate::process::ServiceManager;
use crate::service::state::StatusSnapshot;
use crate::web::sse::Broadcaster;

const STATUS_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Clone)]
pub struct AppState {
    pub config_manager: Arc<ConfigManager>,
    pub service_manager: Arc<ServiceManager>,
    pub status_broadcaster: Arc<Broadcaster<StatusSnapshot>>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config_manager: Arc<ConfigManager>, service_manager: Arc<ServiceManager>) -> Self {
        Self {
            config_manager,
            service_manager,
            status_broadcaster: Broadcaster::new(),
            started_at: Utc::now(),
        }
    }

    /// Background task grounded in the data-flow note that J "reads F
    /// periodically and fans out to connected viewers" — polls the
    /// worker's status over RPC and republishes it to every SSE viewer.
    pub fn spawn_status_poller(&self, shutdown: CancellationToken) {
        let service_manager = self.service_manager.clone();
        let broadcaster = self.status_broadcaster.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(STATUS_POLL_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = interval.tick() => {}
                }
                match service_manager.get_client().await {
                    Ok(client) => match client.get_status().await {
                        Ok(status) => broadcaster.broadcast(status).await,
                        Err(e) => warn!(error = %e, "status poll failed"),
                    },
                    Err(e) => warn!(error = %e, "status poll could not reach worker"),
                }
            }
        });
    }
}
