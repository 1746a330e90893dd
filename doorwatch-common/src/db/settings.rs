//! Settings database operations
//!
//! Get/set accessors for the settings table following a key-value pattern.
//! Values are stored as text and parsed by the typed accessors.

use crate::{Error, Result};
use sqlx::{Pool, Sqlite};

/// Get a setting value, parsed into the requested type
///
/// Returns `None` if the key is not set. A stored value that fails to parse
/// is an error rather than a silent default.
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match row {
        Some((value,)) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Internal(format!("Setting '{}' unparsable: {}", key, e))),
        None => Ok(None),
    }
}

/// Set a setting value (insert or replace)
pub async fn set_setting(db: &Pool<Sqlite>, key: &str, value: impl ToString) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, datetime('now'))
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;
    Ok(())
}

/// Get the Clarifai API key from the settings table
pub async fn get_clarifai_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, "clarifai_api_key").await
}

/// Set the Clarifai API key in the settings table
pub async fn set_clarifai_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, "clarifai_api_key", key).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_in_memory;

    #[tokio::test]
    async fn set_then_get_roundtrip() {
        let db = init_in_memory().await.unwrap();

        set_setting(&db, "threshold", 0.8).await.unwrap();
        let value: Option<f64> = get_setting(&db, "threshold").await.unwrap();
        assert_eq!(value, Some(0.8));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let db = init_in_memory().await.unwrap();
        let value: Option<String> = get_setting(&db, "nope").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn set_overwrites_existing_value() {
        let db = init_in_memory().await.unwrap();

        set_clarifai_api_key(&db, "first".to_string()).await.unwrap();
        set_clarifai_api_key(&db, "second".to_string()).await.unwrap();

        let key = get_clarifai_api_key(&db).await.unwrap();
        assert_eq!(key.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn unparsable_value_is_an_error() {
        let db = init_in_memory().await.unwrap();
        set_setting(&db, "threshold", "not-a-number").await.unwrap();

        let result: Result<Option<f64>> = get_setting(&db, "threshold").await;
        assert!(result.is_err());
    }
}
