//! HTTP API handlers for doorwatch-an

pub mod analyze;
pub mod health;
pub mod pause;
pub mod settings;
pub mod sse;

pub use analyze::analyze_routes;
pub use health::health_routes;
pub use pause::pause_routes;
pub use settings::settings_routes;
pub use sse::event_stream;
