//! Pause gate API
//!
//! `GET /pause?delay=<seconds>`, `GET /isPaused`, `GET /enable`. Route
//! names follow the motion service's existing integration.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use doorwatch_common::events::AnalysisEvent;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct PauseParams {
    /// Seconds to suppress admissions for
    pub delay: u64,
}

#[derive(Debug, Serialize)]
pub struct PauseResponse {
    pub remaining_seconds: u64,
}

/// GET /pause?delay=N
pub async fn pause(
    State(state): State<AppState>,
    Query(params): Query<PauseParams>,
) -> ApiResult<Json<PauseResponse>> {
    let remaining_seconds = state.pause_gate.pause(params.delay);
    info!("Analysis paused for {}s", remaining_seconds);

    state.event_bus.emit(AnalysisEvent::PauseChanged {
        remaining_seconds,
        timestamp: Utc::now(),
    });
    Ok(Json(PauseResponse { remaining_seconds }))
}

/// GET /isPaused
pub async fn is_paused(State(state): State<AppState>) -> Json<PauseResponse> {
    Json(PauseResponse {
        remaining_seconds: state.pause_gate.remaining_seconds(),
    })
}

/// GET /enable
pub async fn enable(State(state): State<AppState>) -> Json<PauseResponse> {
    state.pause_gate.enable();
    info!("Analysis enabled");

    state.event_bus.emit(AnalysisEvent::PauseChanged {
        remaining_seconds: 0,
        timestamp: Utc::now(),
    });
    Json(PauseResponse {
        remaining_seconds: 0,
    })
}

/// Build pause routes
pub fn pause_routes() -> Router<AppState> {
    Router::new()
        .route("/pause", get(pause))
        .route("/isPaused", get(is_paused))
        .route("/enable", get(enable))
}
