//! Configuration loading and root folder resolution
//!
//! The root folder holds the service database. It is resolved with the
//! following priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`DOORWATCH_ROOT`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ROOT_ENV_VAR: &str = "DOORWATCH_ROOT";

/// TOML configuration file contents (`doorwatch.toml`)
///
/// All keys are optional; the service applies its own defaults. Secrets
/// (Clarifai key, email password) may instead come from the environment or
/// the settings table, which take precedence over this file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Root folder override (database location)
    pub root_folder: Option<String>,

    /// HTTP listener host (default 127.0.0.1)
    pub host: Option<String>,
    /// HTTP listener port
    pub port: Option<u16>,

    /// Clarifai personal access token
    pub clarifai_api_key: Option<String>,
    /// Clarifai model identifier
    pub model_id: Option<String>,
    /// Confidence threshold in [0,1] for a noteworthy image
    pub threshold: Option<f32>,

    /// Monthly ceiling on classification calls
    pub monthly_call_ceiling: Option<u32>,

    /// Quiet window for notification batching, in minutes
    pub quiet_window_minutes: Option<u64>,

    /// S3 bucket for archived images
    pub s3_bucket: Option<String>,
    /// S3 region
    pub s3_region: Option<String>,
    /// Presigned URL lifetime, in hours
    pub presign_ttl_hours: Option<u64>,

    /// Webhook notified on the first success of a burst
    pub notification_url: Option<String>,
    /// Callback invoked after a single archived image, `{url}` is replaced
    /// with the percent-encoded presigned location
    pub after_stored_url: Option<String>,

    /// Notification email recipient
    pub email_recipient: Option<String>,
    /// Sending email account
    pub email_account: Option<String>,
    /// Sending email password
    pub email_password: Option<String>,
    /// SMTP relay host (default smtp.gmail.com)
    pub smtp_relay: Option<String>,
    /// Notification email subject
    pub email_subject: Option<String>,
}

impl TomlConfig {
    /// Load the TOML config from the platform config directory.
    ///
    /// Missing file is not an error; an unparsable file is.
    pub fn load() -> Result<Self> {
        match find_config_file() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load the TOML config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }
}

/// Locate the configuration file for the platform
///
/// Tries `~/.config/doorwatch/doorwatch.toml` first, then
/// `/etc/doorwatch/doorwatch.toml` on Linux.
pub fn find_config_file() -> Option<PathBuf> {
    if let Some(path) = dirs::config_dir().map(|d| d.join("doorwatch").join("doorwatch.toml")) {
        if path.exists() {
            return Some(path);
        }
    }
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/doorwatch/doorwatch.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }
    None
}

/// Resolve the root folder following the documented priority order
pub fn resolve_root_folder(cli_arg: Option<&str>, toml_config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &toml_config.root_folder {
        return PathBuf::from(path);
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("doorwatch"))
        .unwrap_or_else(|| PathBuf::from("./doorwatch_data"))
}

/// Create the root folder if missing and return the database path inside it
pub fn prepare_root_folder(root: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    Ok(root.join("doorwatch.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_config_parses_all_keys() {
        let config: TomlConfig = toml::from_str(
            r#"
            root_folder = "/var/lib/doorwatch"
            port = 5731
            model_id = "general-image-recognition"
            threshold = 0.8
            monthly_call_ceiling = 5000
            quiet_window_minutes = 5
            s3_bucket = "front-door"
            s3_region = "us-east-1"
            notification_url = "https://example.com/hook"
            email_recipient = "alerts@example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.root_folder.as_deref(), Some("/var/lib/doorwatch"));
        assert_eq!(config.port, Some(5731));
        assert_eq!(config.threshold, Some(0.8));
        assert_eq!(config.monthly_call_ceiling, Some(5000));
        assert_eq!(config.quiet_window_minutes, Some(5));
        assert_eq!(config.s3_bucket.as_deref(), Some("front-door"));
    }

    #[test]
    fn toml_config_tolerates_empty_file() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert!(config.clarifai_api_key.is_none());
        assert!(config.port.is_none());
    }

    #[test]
    fn cli_argument_wins_over_toml() {
        let toml_config = TomlConfig {
            root_folder: Some("/from/toml".to_string()),
            ..Default::default()
        };
        let resolved = resolve_root_folder(Some("/from/cli"), &toml_config);
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }

    #[test]
    fn prepare_root_folder_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("root");
        let db_path = prepare_root_folder(&root).unwrap();
        assert!(root.is_dir());
        assert!(db_path.ends_with("doorwatch.db"));
    }
}
