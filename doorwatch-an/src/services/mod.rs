//! Service components for doorwatch-an
//!
//! Admission control (quota, pause), classification, and the notification
//! coalescer with its collaborator adapters.

pub mod archiver;
pub mod classifier;
pub mod coalescer;
pub mod mailer;
pub mod notifier;
pub mod pause;
pub mod quota;
pub mod recognizer;
