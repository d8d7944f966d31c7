//! [MODULE F] DownloadService — phase state machine wiring Generator,
//! Optimizer and Executor together with persistence and progress
//! aggregation (§4.F).

pub mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog::{CatalogProvider, Downloader};
use crate::config::ConfigManager;
use crate::engine::{Executor, Generator, Optimizer};
use crate::errors::{AppError, ServiceError};
use crate::plan::DownloadPlan;
use crate::service::state::{ServicePhase, ServiceRunState, StatusSnapshot};
use crate::utils::file_cache::FileExistenceCache;

const SAVE_THROTTLE: Duration = Duration::from_secs(2);
const STOP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DownloadService {
    config_manager: Arc<ConfigManager>,
    catalog: Arc<dyn CatalogProvider>,
    downloader: Arc<dyn Downloader>,
    file_cache: Arc<FileExistenceCache>,
    plan_dir: PathBuf,
    persistence_enabled: bool,

    phase: RwLock<ServicePhase>,
    plan: RwLock<Option<Arc<DownloadPlan>>>,
    started_at: RwLock<Option<DateTime<Utc>>>,
    completed_at: RwLock<Option<DateTime<Utc>>>,
    error_message: RwLock<Option<String>>,

    last_save: std::sync::Mutex<Instant>,
    shutdown_token: RwLock<Option<CancellationToken>>,
    executor_task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl DownloadService {
    pub fn new(
        config_manager: Arc<ConfigManager>,
        catalog: Arc<dyn CatalogProvider>,
        downloader: Arc<dyn Downloader>,
        file_cache: Arc<FileExistenceCache>,
        plan_dir: PathBuf,
        persistence_enabled: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            config_manager,
            catalog,
            downloader,
            file_cache,
            plan_dir,
            persistence_enabled,
            phase: RwLock::new(ServicePhase::Idle),
            plan: RwLock::new(None),
            started_at: RwLock::new(None),
            completed_at: RwLock::new(None),
            error_message: RwLock::new(None),
            last_save: std::sync::Mutex::new(Instant::now() - SAVE_THROTTLE),
            shutdown_token: RwLock::new(None),
            executor_task: tokio::sync::Mutex::new(None),
        })
    }

    fn progress_path(&self) -> PathBuf {
        self.plan_dir.join("download_plan_progress.json")
    }

    fn final_path(&self) -> PathBuf {
        self.plan_dir.join("download_plan.json")
    }

    pub async fn phase(&self) -> ServicePhase {
        *self.phase.read().await
    }

    pub async fn status(&self) -> StatusSnapshot {
        let phase = self.phase().await;
        let plan_guard = self.plan.read().await;
        let (stats, total) = if let Some(plan) = plan_guard.as_ref() {
            let stats = plan.get_execution_statistics().await;
            (stats.clone(), stats.total)
        } else {
            (Default::default(), 0)
        };
        let progress_percentage = if total == 0 {
            if matches!(phase, ServicePhase::Completed) {
                100.0
            } else {
                0.0
            }
        } else {
            ((stats.completed + stats.skipped) as f64 / total as f64) * 100.0
        };

        StatusSnapshot {
            state: ServiceRunState::from(phase),
            phase,
            progress_percentage,
            total_tracks: total,
            pending: stats.pending,
            in_progress: stats.in_progress,
            completed: stats.completed,
            failed: stats.failed,
            skipped: stats.skipped,
            started_at: *self.started_at.read().await,
            completed_at: *self.completed_at.read().await,
            error: self.error_message.read().await.clone(),
        }
    }

    /// Start: resumes from a persisted plan if one exists, otherwise
    /// generates + optimizes a fresh one, then spawns the Executor in the
    /// background (§4.F "Start").
    pub async fn start(self: &Arc<Self>) -> Result<(), AppError> {
        {
            let phase = self.phase.read().await;
            if matches!(
                *phase,
                ServicePhase::Generating | ServicePhase::Optimizing | ServicePhase::Executing
            ) {
                return Err(ServiceError::WrongState {
                    state: phase.to_string(),
                }
                .into());
            }
        }

        self.config_manager.apply_pending_update().await;
        let config = Arc::new(self.config_manager.active().await);

        let resumed = self.persistence_enabled
            && tokio::fs::try_exists(self.progress_path()).await.unwrap_or(false);

        let plan = if resumed {
            *self.phase.write().await = ServicePhase::Executing;
            match DownloadPlan::load(self.progress_path()).await {
                Ok(plan) => plan,
                Err(e) => {
                    self.fail(format!("failed to load persisted plan: {e}")).await;
                    return Err(e.into());
                }
            }
        } else {
            *self.phase.write().await = ServicePhase::Generating;
            let generator = Generator::new(self.catalog.as_ref());
            let plan = match generator.generate(&config).await {
                Ok(plan) => plan,
                Err(e) => {
                    self.fail(format!("plan generation failed: {e}")).await;
                    return Err(e.into());
                }
            };

            *self.phase.write().await = ServicePhase::Optimizing;
            let optimizer = Optimizer::new(&config, &self.file_cache);
            optimizer.optimize(&plan).await;

            *self.phase.write().await = ServicePhase::Executing;
            plan
        };

        let plan = Arc::new(plan);
        *self.plan.write().await = Some(plan.clone());
        *self.started_at.write().await = Some(Utc::now());
        *self.completed_at.write().await = None;
        *self.error_message.write().await = None;

        let shutdown = CancellationToken::new();
        *self.shutdown_token.write().await = Some(shutdown.clone());

        let service = self.clone();
        let downloader = self.downloader.clone();
        let on_progress = {
            let service = service.clone();
            Arc::new(move |item: &crate::plan::PlanItem| {
                let terminal = matches!(
                    item.status,
                    crate::plan::ItemStatus::Completed
                        | crate::plan::ItemStatus::Failed
                        | crate::plan::ItemStatus::Skipped
                );
                service.trigger_save(terminal);
            })
        };

        let executor = Executor::new(config, downloader, shutdown, on_progress);
        let task_plan = plan;
        let task_service = service.clone();
        let handle = tokio::spawn(async move {
            executor.execute(&task_plan).await;
            task_service.finish_execution(&task_plan).await;
        });
        *self.executor_task.lock().await = Some(handle);

        Ok(())
    }

    async fn finish_execution(&self, plan: &Arc<DownloadPlan>) {
        if self.persistence_enabled {
            if let Err(e) = plan.save(self.progress_path()).await {
                warn!(error = %e, "final progress save failed");
            }
            if let Err(e) = plan.save(self.final_path()).await {
                warn!(error = %e, "final plan save failed");
            }
        }
        *self.completed_at.write().await = Some(Utc::now());
        *self.phase.write().await = ServicePhase::Completed;
        info!("download service run completed");
    }

    async fn fail(&self, message: String) {
        error!(message = %message, "download service entering error phase");
        *self.error_message.write().await = Some(message);
        *self.phase.write().await = ServicePhase::Error;
        *self.completed_at.write().await = Some(Utc::now());
    }

    /// Non-blocking throttle check invoked from the (synchronous) progress
    /// callback; the actual save runs on a spawned task (§4.F "Progress
    /// callback").
    fn trigger_save(self: &Arc<Self>, force: bool) {
        let should_save = {
            let mut last_save = self.last_save.lock().expect("last_save mutex poisoned");
            if force || last_save.elapsed() >= SAVE_THROTTLE {
                *last_save = Instant::now();
                true
            } else {
                false
            }
        };
        if !should_save || !self.persistence_enabled {
            return;
        }
        let service = self.clone();
        tokio::spawn(async move {
            let plan_guard = service.plan.read().await;
            if let Some(plan) = plan_guard.as_ref() {
                if let Err(e) = plan.save(service.progress_path()).await {
                    warn!(error = %e, "throttled plan save failed");
                }
            }
        });
    }

    /// Stop: synchronous final save, request executor shutdown, wait up to
    /// 30 seconds, escalate to the error phase on timeout (§4.F "Stop").
    pub async fn stop(self: &Arc<Self>) -> Result<(), AppError> {
        let phase = self.phase().await;
        if !matches!(
            phase,
            ServicePhase::Generating | ServicePhase::Optimizing | ServicePhase::Executing
        ) {
            return Err(ServiceError::WrongState {
                state: phase.to_string(),
            }
            .into());
        }

        *self.phase.write().await = ServicePhase::Stopping;

        if self.persistence_enabled {
            if let Some(plan) = self.plan.read().await.as_ref() {
                if let Err(e) = plan.save(self.progress_path()).await {
                    warn!(error = %e, "stop-time plan save failed");
                }
            }
        }

        if let Some(token) = self.shutdown_token.read().await.as_ref() {
            token.cancel();
        }

        let handle = self.executor_task.lock().await.take();
        if let Some(handle) = handle {
            match tokio::time::timeout(STOP_TIMEOUT, handle).await {
                Ok(_) => {
                    *self.phase.write().await = ServicePhase::Idle;
                    Ok(())
                }
                Err(_) => {
                    self.fail("shutdown timeout exceeded".to_string()).await;
                    Err(ServiceError::ShutdownTimeout.into())
                }
            }
        } else {
            *self.phase.write().await = ServicePhase::Idle;
            Ok(())
        }
    }

    /// Reset: returns to idle from any state, clearing the pending config
    /// and persisted plan files (§4.F).
    pub async fn reset(self: &Arc<Self>) -> Result<(), AppError> {
        let phase = self.phase().await;
        if matches!(
            phase,
            ServicePhase::Generating | ServicePhase::Optimizing | ServicePhase::Executing
        ) {
            self.stop().await.ok();
        }

        // Drains (and discards) any queued config update without applying it.
        self.config_manager.clear_pending().await;

        if tokio::fs::try_exists(self.progress_path()).await.unwrap_or(false) {
            let _ = tokio::fs::remove_file(self.progress_path()).await;
        }
        if tokio::fs::try_exists(self.final_path()).await.unwrap_or(false) {
            let _ = tokio::fs::remove_file(self.final_path()).await;
        }

        *self.plan.write().await = None;
        *self.started_at.write().await = None;
        *self.completed_at.write().await = None;
        *self.error_message.write().await = None;
        *self.phase.write().await = ServicePhase::Idle;
        Ok(())
    }

    pub async fn plan(&self) -> Option<Arc<DownloadPlan>> {
        self.plan.read().await.clone()
    }
}
