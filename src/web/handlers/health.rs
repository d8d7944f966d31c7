//! `/api/health` and `/api/health/stats` (§6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::json;

use crate::rpc::PROTOCOL_VERSION;
use crate::web::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let client = match state.service_manager.get_client().await {
        Ok(client) => client,
        Err(_) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "services": {
                        "web_server": "healthy",
                        "download_service": { "status": "unreachable", "version": PROTOCOL_VERSION },
                    },
                })),
            );
        }
    };

    match client.health_check().await {
        Ok((_, readiness, service_health)) => {
            let status_code = if readiness {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            let status_snapshot = client.get_status().await.ok();
            let body = json!({
                "status": if readiness { "healthy" } else { "unhealthy" },
                "phase": status_snapshot.as_ref().map(|s| s.phase.to_string()),
                "statistics": status_snapshot.as_ref().map(|s| json!({
                    "pending": s.pending,
                    "in_progress": s.in_progress,
                    "completed": s.completed,
                    "failed": s.failed,
                    "skipped": s.skipped,
                    "total": s.total_tracks,
                })),
                "services": {
                    "web_server": "healthy",
                    "download_service": { "status": service_health, "version": PROTOCOL_VERSION },
                },
            });
            (status_code, Json(body))
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "services": {
                    "web_server": "healthy",
                    "download_service": { "status": "unreachable", "version": PROTOCOL_VERSION, "error": e.to_string() },
                },
            })),
        ),
    }
}

pub async fn health_stats(State(state): State<AppState>) -> impl IntoResponse {
    let uptime_seconds = (chrono::Utc::now() - state.started_at).num_seconds().max(0);

    let Ok(client) = state.service_manager.get_client().await else {
        return Json(json!({
            "uptime_seconds": uptime_seconds,
            "success_rate": null,
            "failure_rate": null,
        }));
    };

    let Ok(status) = client.get_status().await else {
        return Json(json!({
            "uptime_seconds": uptime_seconds,
            "success_rate": null,
            "failure_rate": null,
        }));
    };

    let terminal = status.completed + status.failed + status.skipped;
    let (success_rate, failure_rate) = if terminal == 0 {
        (None, None)
    } else {
        (
            Some((status.completed + status.skipped) as f64 / terminal as f64),
            Some(status.failed as f64 / terminal as f64),
        )
    };

    Json(json!({
        "uptime_seconds": uptime_seconds,
        "success_rate": success_rate,
        "failure_rate": failure_rate,
        "completed": status.completed,
        "failed": status.failed,
        "skipped": status.skipped,
    }))
}
