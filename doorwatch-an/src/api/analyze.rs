//! Analysis entry point
//!
//! `GET /analyze?file=<path>` validates the file, checks the pause gate,
//! classifies, and routes the outcome. Quota declines are reported in the
//! body, not as errors; classification failures surface as 5xx so the
//! motion service can retry.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use doorwatch_common::events::AnalysisEvent;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::types::{Artifact, ClassificationOutcome};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
    /// Local path of the image to classify
    pub file: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    /// "success", "failure", "declined", or "paused"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl AnalyzeResponse {
    fn new(status: &str, confidence: Option<f32>) -> Self {
        Self {
            status: status.to_string(),
            confidence,
        }
    }
}

/// GET /analyze handler
pub async fn analyze(
    State(state): State<AppState>,
    Query(params): Query<AnalyzeParams>,
) -> ApiResult<Json<AnalyzeResponse>> {
    info!("Starting {}", params.file);

    let path = PathBuf::from(&params.file);
    if !path.exists() {
        error!("{} does not exist", params.file);
        return Err(ApiError::NotFound(format!("{} does not exist", params.file)));
    }

    let remaining = state.pause_gate.remaining_seconds();
    if remaining > 0 {
        warn!(
            "Analysis paused ({}s remaining), dropping {}",
            remaining, params.file
        );
        return Ok(Json(AnalyzeResponse::new("paused", None)));
    }

    // One classification per artifact at a time
    {
        let mut in_flight = state.in_flight.lock().await;
        if !in_flight.insert(path.clone()) {
            return Err(ApiError::Conflict(format!(
                "{} is already being analyzed",
                params.file
            )));
        }
    }

    let result = run_analysis(&state, path.clone()).await;
    state.in_flight.lock().await.remove(&path);

    let response = result?;
    info!("Done {}", params.file);
    Ok(Json(response))
}

async fn run_analysis(state: &AppState, path: PathBuf) -> ApiResult<AnalyzeResponse> {
    let artifact = Artifact::new(path);

    state.event_bus.emit(AnalysisEvent::AnalysisStarted {
        file: artifact.path().display().to_string(),
        timestamp: Utc::now(),
    });

    match state.classifier.classify(&artifact).await {
        Ok(ClassificationOutcome::Success { confidence }) => {
            state.event_bus.emit(AnalysisEvent::ArtifactClassified {
                file: artifact.path().display().to_string(),
                confidence,
                noteworthy: true,
                timestamp: Utc::now(),
            });
            state.coalescer.on_success(artifact).await;
            Ok(AnalyzeResponse::new("success", Some(confidence)))
        }
        Ok(ClassificationOutcome::Failure { confidence }) => {
            state.event_bus.emit(AnalysisEvent::ArtifactClassified {
                file: artifact.path().display().to_string(),
                confidence,
                noteworthy: false,
                timestamp: Utc::now(),
            });
            state.coalescer.on_failure(artifact).await;
            Ok(AnalyzeResponse::new("failure", Some(confidence)))
        }
        Ok(ClassificationOutcome::QuotaExceeded) => {
            state.event_bus.emit(AnalysisEvent::QuotaDeclined {
                calls_this_month: state.quota.calls_this_month().await.unwrap_or(-1),
                allowed_today: state.quota.allowed_today(),
                timestamp: Utc::now(),
            });
            Ok(AnalyzeResponse::new("declined", None))
        }
        Err(e) => {
            error!("Classification failed for {}: {}", artifact.name(), e);
            *state.last_error.write().await = Some(e.to_string());
            Err(ApiError::Internal(e.to_string()))
        }
    }
}

/// Build analyze routes
pub fn analyze_routes() -> Router<AppState> {
    Router::new().route("/analyze", get(analyze))
}
