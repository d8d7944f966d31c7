//! `/api/download/{start,stop,reset,status}` (§6, §4.H→§4.I bridge).

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::web::responses::ApiError;
use crate::web::state::AppState;

pub async fn start(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let client = state
        .service_manager
        .get_client()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    state.config_manager.apply_pending_update().await;
    let config = state.config_manager.active().await;
    let (success, error_message) = client
        .start_download(
            config,
            "download_plan_progress.json".to_string(),
            "cratedigger.log.jsonl".to_string(),
        )
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    if !success {
        return Err(ApiError::bad_request(
            error_message.unwrap_or_else(|| "download could not be started".to_string()),
        ));
    }
    Ok(Json(json!({ "success": true })))
}

pub async fn stop(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let client = state
        .service_manager
        .get_client()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let success = client
        .stop_download()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    if !success {
        return Err(ApiError::bad_request("download service is not running"));
    }
    Ok(Json(json!({ "success": true })))
}

pub async fn reset(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let client = state
        .service_manager
        .get_client()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    client
        .reset_download()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(json!({ "success": true })))
}

pub async fn status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let client = state
        .service_manager
        .get_client()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let status = client
        .get_status()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(status))
}
