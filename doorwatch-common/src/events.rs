//! Event types for the doorwatch event system
//!
//! Provides shared event definitions and the EventBus used to broadcast
//! them to SSE subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Doorwatch event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AnalysisEvent {
    /// A file was accepted for analysis
    AnalysisStarted {
        /// Local path of the image under analysis
        file: String,
        timestamp: DateTime<Utc>,
    },

    /// The remote recognition call completed and produced a verdict
    ArtifactClassified {
        /// Local path of the classified image
        file: String,
        /// Confidence reported for the deciding concept
        confidence: f32,
        /// Whether the confidence met the configured threshold
        noteworthy: bool,
        timestamp: DateTime<Utc>,
    },

    /// Admission declined because the monthly budget was exhausted
    QuotaDeclined {
        /// Calls recorded so far this month
        calls_this_month: i64,
        /// Calls currently allowed by the pro-rated budget
        allowed_today: i64,
        timestamp: DateTime<Utc>,
    },

    /// A deferred flush was (re)scheduled by the coalescer
    FlushScheduled {
        /// Artifacts buffered so far
        buffered: usize,
        /// Seconds until the pending flush fires
        flush_in_seconds: u64,
        timestamp: DateTime<Utc>,
    },

    /// A batch of successful artifacts was flushed
    BatchFlushed {
        /// Number of artifacts in the flush
        artifact_count: usize,
        /// Whether the webhook notification fired with this flush
        fired_notification: bool,
        timestamp: DateTime<Utc>,
    },

    /// Pause state changed via the operator API
    PauseChanged {
        /// Seconds remaining in the pause window (0 = live)
        remaining_seconds: u64,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for [`AnalysisEvent`]s
///
/// Thin wrapper over `tokio::sync::broadcast`. Subscribers that lag beyond
/// the channel capacity miss the oldest events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AnalysisEvent>,
}

impl EventBus {
    /// Create a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// A send error only means no subscriber is currently listening; events
    /// are advisory, so that case is logged at debug level and ignored.
    pub fn emit(&self, event: AnalysisEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("No SSE subscribers, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(AnalysisEvent::PauseChanged {
            remaining_seconds: 30,
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            AnalysisEvent::PauseChanged { remaining_seconds, .. } => {
                assert_eq!(remaining_seconds, 30)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_without_subscribers_is_not_an_error() {
        let bus = EventBus::new(4);
        bus.emit(AnalysisEvent::AnalysisStarted {
            file: "/tmp/a.jpg".to_string(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = AnalysisEvent::BatchFlushed {
            artifact_count: 3,
            fired_notification: false,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BatchFlushed");
        assert_eq!(json["artifact_count"], 3);
    }
}
