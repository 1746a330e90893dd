//! Configuration resolution for doorwatch-an
//!
//! Static settings resolve ENV → TOML → default. The Clarifai credential
//! follows the Database → ENV → TOML priority so a key configured through
//! the settings API survives restarts and wins over file configuration.

use doorwatch_common::config::TomlConfig;
use doorwatch_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::time::Duration;
use tracing::info;

use crate::services::mailer::MailSettings;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5731;
const DEFAULT_MODEL_ID: &str = "general-image-recognition";
const DEFAULT_THRESHOLD: f32 = 0.75;
const DEFAULT_MONTHLY_CALL_CEILING: u32 = 5000;
const DEFAULT_QUIET_WINDOW_MINUTES: u64 = 5;
const DEFAULT_S3_REGION: &str = "us-east-1";
const DEFAULT_PRESIGN_TTL_HOURS: u64 = 24;

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,

    pub model_id: String,
    pub threshold: f32,
    pub monthly_call_ceiling: u32,
    pub quiet_window: Duration,

    pub s3_bucket: Option<String>,
    pub s3_region: String,
    pub presign_ttl: Duration,

    pub notification_url: Option<String>,
    pub after_stored_url: Option<String>,

    pub mail: MailSettings,
}

impl ServiceConfig {
    /// Resolve every static setting with ENV → TOML → default priority
    pub fn resolve(toml_config: &TomlConfig) -> Self {
        let threshold = env_var("DOORWATCH_THRESHOLD")
            .and_then(|v| v.parse().ok())
            .or(toml_config.threshold)
            .unwrap_or(DEFAULT_THRESHOLD)
            .clamp(0.0, 1.0);

        let quiet_window_minutes = env_var("DOORWATCH_QUIET_WINDOW_MINUTES")
            .and_then(|v| v.parse().ok())
            .or(toml_config.quiet_window_minutes)
            .unwrap_or(DEFAULT_QUIET_WINDOW_MINUTES);

        let presign_ttl_hours = env_var("DOORWATCH_PRESIGN_TTL_HOURS")
            .and_then(|v| v.parse().ok())
            .or(toml_config.presign_ttl_hours)
            .unwrap_or(DEFAULT_PRESIGN_TTL_HOURS);

        Self {
            host: env_var("DOORWATCH_HOST")
                .or_else(|| toml_config.host.clone())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: env_var("DOORWATCH_PORT")
                .and_then(|v| v.parse().ok())
                .or(toml_config.port)
                .unwrap_or(DEFAULT_PORT),

            model_id: env_var("DOORWATCH_MODEL_ID")
                .or_else(|| toml_config.model_id.clone())
                .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            threshold,
            monthly_call_ceiling: env_var("DOORWATCH_MONTHLY_CALL_CEILING")
                .and_then(|v| v.parse().ok())
                .or(toml_config.monthly_call_ceiling)
                .unwrap_or(DEFAULT_MONTHLY_CALL_CEILING),
            quiet_window: Duration::from_secs(quiet_window_minutes * 60),

            s3_bucket: env_var("DOORWATCH_S3_BUCKET").or_else(|| toml_config.s3_bucket.clone()),
            s3_region: env_var("DOORWATCH_S3_REGION")
                .or_else(|| toml_config.s3_region.clone())
                .unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
            presign_ttl: Duration::from_secs(presign_ttl_hours * 60 * 60),

            notification_url: env_var("DOORWATCH_NOTIFICATION_URL")
                .or_else(|| toml_config.notification_url.clone()),
            after_stored_url: env_var("DOORWATCH_AFTER_STORED_URL")
                .or_else(|| toml_config.after_stored_url.clone()),

            mail: MailSettings {
                account: env_var("DOORWATCH_EMAIL_ACCOUNT")
                    .or_else(|| toml_config.email_account.clone()),
                password: env_var("DOORWATCH_EMAIL_PASSWORD")
                    .or_else(|| toml_config.email_password.clone()),
                recipient: env_var("DOORWATCH_EMAIL_RECIPIENT")
                    .or_else(|| toml_config.email_recipient.clone()),
                relay: env_var("DOORWATCH_SMTP_RELAY").or_else(|| toml_config.smtp_relay.clone()),
                subject: env_var("DOORWATCH_EMAIL_SUBJECT")
                    .or_else(|| toml_config.email_subject.clone()),
            },
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve the Clarifai API key with Database → ENV → TOML priority
pub async fn resolve_clarifai_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<String> {
    if let Some(key) = doorwatch_common::db::settings::get_clarifai_api_key(db).await? {
        if is_valid_key(&key) {
            info!("Clarifai API key loaded from database");
            return Ok(key);
        }
    }

    if let Some(key) = env_var("DOORWATCH_CLARIFAI_API_KEY") {
        if is_valid_key(&key) {
            info!("Clarifai API key loaded from environment variable");
            return Ok(key);
        }
    }

    if let Some(key) = &toml_config.clarifai_api_key {
        if is_valid_key(key) {
            info!("Clarifai API key loaded from TOML config");
            return Ok(key.clone());
        }
    }

    Err(Error::Config(
        "Clarifai API key not configured. Please configure using one of:\n\
         1. API: POST /api/settings/clarifai_api_key\n\
         2. Environment: DOORWATCH_CLARIFAI_API_KEY=your-key-here\n\
         3. TOML config: ~/.config/doorwatch/doorwatch.toml (clarifai_api_key = \"your-key\")"
            .to_string(),
    ))
}
