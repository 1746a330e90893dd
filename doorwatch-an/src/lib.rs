//! doorwatch-an library interface
//!
//! Exposes the application state and router for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod types;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use doorwatch_common::events::EventBus;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::{Mutex, RwLock};

use crate::services::classifier::Classifier;
use crate::services::coalescer::BatchCoalescer;
use crate::services::pause::PauseGate;
use crate::services::quota::QuotaTracker;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Quota-gated classifier
    pub classifier: Arc<Classifier>,
    /// Success batching / notification scheduler
    pub coalescer: Arc<BatchCoalescer>,
    /// Operator pause gate in front of admission
    pub pause_gate: Arc<PauseGate>,
    /// Monthly budget tracker (diagnostics, quota events)
    pub quota: Arc<QuotaTracker>,
    /// Clarifai credential, shared with the recognition client so settings
    /// updates apply without a restart
    pub api_key: Arc<StdRwLock<String>>,
    /// Paths currently being classified; a second request for the same file
    /// is rejected while the first is in flight
    pub in_flight: Arc<Mutex<HashSet<PathBuf>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        classifier: Arc<Classifier>,
        coalescer: Arc<BatchCoalescer>,
        pause_gate: Arc<PauseGate>,
        quota: Arc<QuotaTracker>,
        api_key: Arc<StdRwLock<String>>,
    ) -> Self {
        Self {
            db,
            event_bus,
            classifier,
            coalescer,
            pause_gate,
            quota,
            api_key,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::analyze_routes())
        .merge(api::pause_routes())
        .merge(api::settings_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .with_state(state)
}
