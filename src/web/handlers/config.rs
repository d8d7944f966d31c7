//! `/api/config`, `/api/config/validate`, `/api/config/digest` (§6, §4.G).

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::config::model::Configuration;
use crate::web::responses::ApiError;
use crate::web::state::AppState;

/// GET /api/config — the spec calls for a YAML body, distinct from the
/// TOML file on disk (§6).
pub async fn get_config(State(state): State<AppState>) -> Result<String, ApiError> {
    let active = state.config_manager.active().await;
    serde_yaml::to_string(&active).map_err(|e| ApiError::internal(e.to_string()))
}

/// PUT /api/config — validates, writes a `.backup` sibling plus the new
/// file, queues the replacement for the next Start, and drops the cached
/// worker connection so a stale client is never reused across a config
/// change that the operator believes already "invalidated" the worker.
pub async fn put_config(
    State(state): State<AppState>,
    Json(new_config): Json<Configuration>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .config_manager
        .queue_update(new_config.clone())
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    state
        .config_manager
        .persist_config(&new_config)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    state.service_manager.invalidate_client().await;

    Ok(Json(json!({ "success": true })))
}

pub async fn validate_config(
    Json(candidate): Json<Configuration>,
) -> impl IntoResponse {
    let errors = candidate.validate();
    if errors.is_empty() {
        Json(json!({ "valid": true, "version": candidate.version }))
    } else {
        Json(json!({ "valid": false, "error": errors.join("; "), "message": "configuration is invalid" }))
    }
}

pub async fn config_digest(State(state): State<AppState>) -> impl IntoResponse {
    let digest = state.config_manager.digest().await;
    let has_pending = state.config_manager.has_pending().await;
    let stats = state.config_manager.config_stats().await;
    Json(json!({
        "digest": digest,
        "version": state.config_manager.active().await.version,
        "has_pending": has_pending,
        "config_stats": {
            "songs": stats.songs,
            "albums": stats.albums,
            "artists": stats.artists,
            "playlists": stats.playlists,
        },
    }))
}
