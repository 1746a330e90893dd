//! Settings API endpoint
//!
//! Provides POST /api/settings/clarifai_api_key so the credential can be
//! configured without editing files. The database copy is authoritative and
//! the in-memory key shared with the recognition client is updated in the
//! same request, so subsequent classifications use the new key immediately.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{ApiError, ApiResult, AppState};

/// Request payload for setting the Clarifai API key
#[derive(Debug, Deserialize)]
pub struct SetApiKeyRequest {
    pub api_key: String,
}

/// Response payload for API key configuration
#[derive(Debug, Serialize)]
pub struct SetApiKeyResponse {
    pub success: bool,
    pub message: String,
}

/// POST /api/settings/clarifai_api_key handler
///
/// Errors:
/// - 400 Bad Request: empty or whitespace-only key
/// - 500 Internal Server Error: database write failure
pub async fn set_clarifai_api_key(
    State(state): State<AppState>,
    Json(payload): Json<SetApiKeyRequest>,
) -> ApiResult<Json<SetApiKeyResponse>> {
    if !crate::config::is_valid_key(&payload.api_key) {
        return Err(ApiError::BadRequest(
            "API key cannot be empty or whitespace-only".to_string(),
        ));
    }

    // Write to database (authoritative)
    doorwatch_common::db::settings::set_clarifai_api_key(&state.db, payload.api_key.clone())
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save API key to database: {}", e)))?;

    // Update the live credential shared with the recognition client
    if let Ok(mut key) = state.api_key.write() {
        *key = payload.api_key;
    }

    info!("Clarifai API key configured via settings API");

    Ok(Json(SetApiKeyResponse {
        success: true,
        message: "Clarifai API key configured successfully".to_string(),
    }))
}

/// Build settings routes
pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/api/settings/clarifai_api_key", post(set_clarifai_api_key))
}
