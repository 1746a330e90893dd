//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE implementation for the doorwatch services.

use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::events::EventBus;

/// Create an SSE stream forwarding [`crate::events::AnalysisEvent`]s
///
/// Each event is serialized to JSON and sent under its enum variant name.
/// A heartbeat comment is sent during idle periods so proxies keep the
/// connection open. Lagged subscribers skip missed events and continue.
pub fn create_event_sse_stream(
    bus: &EventBus,
    service_name: &'static str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} events", service_name);
    let mut rx = bus.subscribe();

    let stream = async_stream::stream! {
        // Initial connected status
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match tokio::time::timeout(Duration::from_secs(15), rx.recv()).await {
                Ok(Ok(event)) => {
                    match serde_json::to_string(&event) {
                        Ok(json) => yield Ok(Event::default().event("AnalysisEvent").data(json)),
                        Err(e) => debug!("SSE: failed to serialize event: {}", e),
                    }
                }
                Ok(Err(RecvError::Lagged(missed))) => {
                    debug!("SSE: subscriber lagged, {} events missed", missed);
                }
                Ok(Err(RecvError::Closed)) => break,
                Err(_elapsed) => {
                    debug!("SSE: sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
