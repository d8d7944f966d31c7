//! `/api/logs` and `/api/logs/stream` (§6, §4.I).

use async_stream::stream;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::time::Duration;

use crate::rpc::LogStreamRequest;
use crate::web::responses::ApiError;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub levels: Option<String>,
    #[serde(default)]
    pub start_epoch: Option<i64>,
    #[serde(default)]
    pub end_epoch: Option<i64>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub max_lines: Option<usize>,
}

fn to_request(query: LogQuery, follow: bool) -> LogStreamRequest {
    LogStreamRequest {
        follow,
        levels: query
            .levels
            .map(|s| s.split(',').map(|v| v.trim().to_string()).collect()),
        start_epoch: query.start_epoch,
        end_epoch: query.end_epoch,
        search: query.search,
        max_lines: query.max_lines,
    }
}

/// GET /api/logs — filtered historical entries, non-follow mode (§6,
/// "Filtered historical entries with `max_lines` default 1000").
pub async fn logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let client = state
        .service_manager
        .get_client()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let mut rx = client
        .stream_logs(to_request(query, false))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let mut entries = Vec::new();
    while let Some(entry) = rx.recv().await {
        entries.push(entry);
    }
    Ok(Json(entries))
}

/// GET /api/logs/stream — follow-mode SSE tailing (§4.I, §4.J heartbeat).
pub async fn logs_stream(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> impl IntoResponse {
    let client = state.service_manager.get_client().await.ok();

    let stream = stream! {
        let Some(client) = client else { return; };
        let Ok(mut rx) = client.stream_logs(to_request(query, true)).await else { return; };
        while let Some(entry) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&entry) {
                yield Ok::<Event, axum::Error>(Event::default().event("log").data(json));
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(1))
            .text("heartbeat"),
    )
}
