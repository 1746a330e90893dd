//! Temporal admission gate
//!
//! Lets an operator suppress new analysis requests for a fixed duration.
//! Requests arriving while paused are dropped by the caller, never queued.

use std::sync::RwLock;
use tokio::time::{Duration, Instant};

/// Operator-controlled pause state
///
/// A single "paused until" instant; absent or elapsed means live.
pub struct PauseGate {
    paused_until: RwLock<Option<Instant>>,
}

impl PauseGate {
    pub fn new() -> Self {
        Self {
            paused_until: RwLock::new(None),
        }
    }

    /// Suppress admissions for `seconds` from now; returns the remaining
    /// seconds (the full duration just set)
    pub fn pause(&self, seconds: u64) -> u64 {
        let mut guard = self.paused_until.write().unwrap();
        *guard = Some(Instant::now() + Duration::from_secs(seconds));
        seconds
    }

    /// Seconds remaining in the pause window, 0 when live
    ///
    /// A sub-second residue still reports 1 so callers keep gating until the
    /// window has fully elapsed.
    pub fn remaining_seconds(&self) -> u64 {
        let guard = self.paused_until.read().unwrap();
        match *guard {
            Some(until) => {
                let now = Instant::now();
                if until <= now {
                    0
                } else {
                    let remaining = until - now;
                    let whole = remaining.as_secs();
                    if remaining.subsec_nanos() > 0 {
                        whole + 1
                    } else {
                        whole
                    }
                }
            }
            None => 0,
        }
    }

    /// Clear the pause immediately
    pub fn enable(&self) {
        let mut guard = self.paused_until.write().unwrap();
        *guard = None;
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}
