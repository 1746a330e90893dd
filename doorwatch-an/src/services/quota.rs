//! Monthly quota tracking for classification calls
//!
//! The monthly ceiling is pro-rated linearly by day-of-month, so early days
//! already admit a proportional share of the budget instead of blocking
//! outright. The check happens strictly before the counter increment, which
//! bounds any overshoot to a single call even under bursty admission.

use chrono::{Datelike, Local, NaiveDate};
use doorwatch_common::{db, Result};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

/// Tracks classification calls against the pro-rated monthly budget
pub struct QuotaTracker {
    db: SqlitePool,
    monthly_ceiling: u32,
}

impl QuotaTracker {
    pub fn new(db: SqlitePool, monthly_ceiling: u32) -> Self {
        Self {
            db,
            monthly_ceiling,
        }
    }

    pub fn monthly_ceiling(&self) -> u32 {
        self.monthly_ceiling
    }

    /// Pure admission check: does the recorded count stay within today's
    /// pro-rated budget? Does not mutate the counter.
    ///
    /// Counter storage failures fail closed: an unreadable counter declines
    /// admission rather than silently re-permitting excess usage.
    pub async fn allow(&self) -> bool {
        let today = Local::now().date_naive();
        match db::quota::get_calls(&self.db, &month_key(today)).await {
            Ok(calls) => admitted(calls, today.day(), days_in_month(today), self.monthly_ceiling),
            Err(e) => {
                error!("Quota counter unreadable, declining admission: {}", e);
                false
            }
        }
    }

    /// Record one classification attempt
    ///
    /// Called immediately before the remote call is made; the attempt is the
    /// metered resource, so a later remote failure still counts.
    pub async fn record_call(&self) -> Result<()> {
        let today = Local::now().date_naive();
        db::quota::increment_calls(&self.db, &month_key(today)).await
    }

    /// Calls recorded for the current month (diagnostics)
    pub async fn calls_this_month(&self) -> Result<i64> {
        let today = Local::now().date_naive();
        db::quota::get_calls(&self.db, &month_key(today)).await
    }

    /// Calls the pro-rated budget permits today (diagnostics)
    pub fn allowed_today(&self) -> i64 {
        let today = Local::now().date_naive();
        allowed_calls(today.day(), days_in_month(today), self.monthly_ceiling) as i64
    }

    /// Drop counters from previous months
    ///
    /// Invoked at startup and on a daily schedule, so a long-idle process
    /// still rolls its counter over no later than the next tick. Idempotent.
    pub async fn reset_if_new_month(&self) -> Result<()> {
        let today = Local::now().date_naive();
        let removed = db::quota::prune_other_months(&self.db, &month_key(today)).await?;
        if removed > 0 {
            info!("Quota counter reset for new month {}", month_key(today));
        }
        Ok(())
    }

    /// Log the admission decline with its budget context
    pub async fn log_declined(&self) -> (i64, i64) {
        let calls = self.calls_this_month().await.unwrap_or(-1);
        let allowed = self.allowed_today();
        warn!(
            calls_this_month = calls,
            allowed_today = allowed,
            "Monthly classification budget exhausted, declining"
        );
        (calls, allowed)
    }
}

/// Counter key for a date, e.g. "2026-08"
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Number of days in the date's month
pub fn days_in_month(date: NaiveDate) -> u32 {
    let (next_year, next_month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .expect("first of month is always valid");
    first_of_next
        .signed_duration_since(NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap())
        .num_days() as u32
}

/// Pro-rated daily budget: `day * (ceiling / days_in_month)`
fn allowed_calls(day: u32, days_in_month: u32, ceiling: u32) -> f64 {
    day as f64 * (ceiling as f64 / days_in_month as f64)
}

/// A call is admitted while the counter stays at or below today's budget
fn admitted(calls: i64, day: u32, days_in_month: u32, ceiling: u32) -> bool {
    calls as f64 <= allowed_calls(day, days_in_month, ceiling)
}
