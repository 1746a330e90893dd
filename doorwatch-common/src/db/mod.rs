//! Database access for doorwatch
//!
//! SQLite-backed persistence: key-value settings and the monthly quota
//! counter. Schema is created idempotently at startup.

mod init;
pub mod quota;
pub mod settings;

pub use init::{init_database, init_in_memory};
