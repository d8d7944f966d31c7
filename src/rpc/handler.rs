//! Bridges the RPC surface to the worker's owned `DownloadService` and
//! `ConfigManager` (§4.I).

use std::sync::Arc;

use crate::config::{ConfigManager, Configuration};
use crate::plan::PlanItem;
use crate::rpc::envelope::PlanItemFilters;
use crate::service::state::StatusSnapshot;
use crate::service::DownloadService;

pub struct WorkerHandler {
    service: Arc<DownloadService>,
    config_manager: Arc<ConfigManager>,
}

impl WorkerHandler {
    pub fn new(service: Arc<DownloadService>, config_manager: Arc<ConfigManager>) -> Self {
        Self {
            service,
            config_manager,
        }
    }

    pub async fn start_download(&self, config: Configuration) -> (bool, Option<String>) {
        if let Err(e) = self.config_manager.queue_update(config).await {
            return (false, Some(e.to_string()));
        }
        match self.service.start().await {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        }
    }

    pub async fn stop_download(&self) -> bool {
        self.service.stop().await.is_ok()
    }

    pub async fn reset_download(&self) -> bool {
        self.service.reset().await.is_ok()
    }

    pub async fn get_status(&self) -> StatusSnapshot {
        self.service.status().await
    }

    pub async fn get_plan_items(&self, filters: PlanItemFilters) -> (Vec<PlanItem>, usize, usize) {
        let Some(plan) = self.service.plan().await else {
            return (Vec::new(), 0, 0);
        };
        let total = plan.item_ids().len();
        let mut items = Vec::new();
        for id in plan.item_ids() {
            let Some(handle) = plan.get_item(id) else {
                continue;
            };
            let item = handle.lock().await.clone();
            if matches_filters(&item, &filters) {
                items.push(item);
            }
        }
        let filtered = items.len();
        (items, total, filtered)
    }

    pub fn validate_config(&self, config: &Configuration) -> (bool, Vec<String>) {
        let errors = config.validate();
        (errors.is_empty(), errors)
    }

    pub async fn health_check(&self) -> (bool, bool, String) {
        let phase = self.service.phase().await;
        let liveness = true;
        let readiness = !matches!(phase, crate::service::state::ServicePhase::Error);
        let service_health = if readiness { "healthy" } else { "unhealthy" };
        (liveness, readiness, service_health.to_string())
    }
}

fn matches_filters(item: &PlanItem, filters: &PlanItemFilters) -> bool {
    if let Some(statuses) = &filters.status {
        if !statuses.contains(&item.status) {
            return false;
        }
    }
    if let Some(types) = &filters.item_type {
        if !types.contains(&item.item_type) {
            return false;
        }
    }
    if let Some(search) = &filters.search {
        let needle = search.to_lowercase();
        let haystack = format!(
            "{} {} {}",
            item.name,
            item.source_url.as_deref().unwrap_or(""),
            item.item_id
        )
        .to_lowercase();
        if !haystack.contains(&needle) {
            return false;
        }
    }
    true
}
