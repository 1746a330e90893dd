//! Server-Sent Events endpoint
//!
//! Streams AnalysisEvents to connected clients with heartbeat keep-alive.

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    doorwatch_common::sse::create_event_sse_stream(&state.event_bus, "doorwatch-an")
}
