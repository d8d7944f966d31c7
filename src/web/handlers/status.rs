//! `/api/status` and `/api/status/stream` (§6, §4.J).

use std::time::Duration;

use async_stream::stream;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::rpc::PlanItemFilters;
use crate::web::responses::ApiError;
use crate::web::state::AppState;

pub async fn status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let client = state
        .service_manager
        .get_client()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let snapshot = client
        .get_status()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let (_, total, _) = client
        .get_plan_items(PlanItemFilters::default())
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(json!({
        "state": snapshot.state,
        "phase": snapshot.phase,
        "progress_percentage": snapshot.progress_percentage,
        "total_tracks": snapshot.total_tracks,
        "pending": snapshot.pending,
        "in_progress": snapshot.in_progress,
        "completed": snapshot.completed,
        "failed": snapshot.failed,
        "skipped": snapshot.skipped,
        "started_at": snapshot.started_at,
        "completed_at": snapshot.completed_at,
        "error": snapshot.error,
        "plan_item_count": total,
    })))
}

/// SSE stream grounded in the teacher's `progress_events_stream`: an
/// initial snapshot, then forwarded broadcaster messages, with a 1-second
/// heartbeat so intermediaries don't time the connection out (§4.J).
pub async fn status_stream(State(state): State<AppState>) -> impl IntoResponse {
    let mut rx = state.status_broadcaster.subscribe().await;
    let initial = state.service_manager.get_client().await.ok();

    let stream = stream! {
        if let Some(client) = initial {
            if let Ok(snapshot) = client.get_status().await {
                if let Ok(json) = serde_json::to_string(&snapshot) {
                    yield Ok::<Event, axum::Error>(Event::default().event("status").data(json));
                }
            }
        }
        while let Some(snapshot) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&snapshot) {
                yield Ok(Event::default().event("status").data(json));
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(1))
            .text("heartbeat"),
    )
}
