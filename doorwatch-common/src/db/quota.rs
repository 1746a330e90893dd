//! Quota counter persistence
//!
//! One row per calendar month (`YYYY-MM`). The counter survives process
//! restarts; rows for past months are pruned by the scheduled reset.

use crate::Result;
use sqlx::{Pool, Sqlite};

/// Get the recorded call count for a month, 0 if no row exists
pub async fn get_calls(db: &Pool<Sqlite>, month: &str) -> Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT calls FROM quota_usage WHERE month = ?")
        .bind(month)
        .fetch_optional(db)
        .await?;
    Ok(row.map(|(calls,)| calls).unwrap_or(0))
}

/// Overwrite the call count for a month
pub async fn set_calls(db: &Pool<Sqlite>, month: &str, calls: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO quota_usage (month, calls)
        VALUES (?, ?)
        ON CONFLICT(month) DO UPDATE SET calls = excluded.calls
        "#,
    )
    .bind(month)
    .bind(calls)
    .execute(db)
    .await?;
    Ok(())
}

/// Increment the call count for a month by one
pub async fn increment_calls(db: &Pool<Sqlite>, month: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO quota_usage (month, calls)
        VALUES (?, 1)
        ON CONFLICT(month) DO UPDATE SET calls = calls + 1
        "#,
    )
    .bind(month)
    .execute(db)
    .await?;
    Ok(())
}

/// Delete counter rows for every month except `current_month`
///
/// Returns the number of rows removed. Idempotent.
pub async fn prune_other_months(db: &Pool<Sqlite>, current_month: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM quota_usage WHERE month != ?")
        .bind(current_month)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}
