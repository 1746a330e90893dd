//! Webhook notification delivery
//!
//! Fire-and-forget GET against the configured notification URL on the first
//! success of a burst, and the post-archive callback carrying a presigned
//! location for single-artifact flushes.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Notification endpoint returned HTTP {0}")]
    Status(u16),
}

/// Outbound notification seam
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Fire the burst-start webhook
    async fn send_notification(&self) -> Result<(), NotifyError>;

    /// Invoke the post-archive callback with the artifact's presigned
    /// location
    async fn send_after_stored(&self, location: &str) -> Result<(), NotifyError>;
}

/// Notifier hitting the configured HTTP endpoints
pub struct WebhookNotifier {
    http_client: reqwest::Client,
    notification_url: Option<String>,
    /// Template with `{url}` replaced by the percent-encoded location
    after_stored_url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(
        notification_url: Option<String>,
        after_stored_url: Option<String>,
    ) -> Result<Self, NotifyError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            notification_url,
            after_stored_url,
        })
    }

    async fn get(&self, url: &str) -> Result<(), NotifyError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    /// Expand the after-stored template for a location
    fn expand_template(template: &str, location: &str) -> String {
        template.replace("{url}", &urlencoding::encode(location))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_notification(&self) -> Result<(), NotifyError> {
        let Some(url) = &self.notification_url else {
            info!("Notification url not configured, not sending");
            return Ok(());
        };

        info!("Sending notification...");
        self.get(url).await?;
        info!("Notification sent");
        Ok(())
    }

    async fn send_after_stored(&self, location: &str) -> Result<(), NotifyError> {
        let Some(template) = &self.after_stored_url else {
            info!("After-stored url not configured, not sending");
            return Ok(());
        };

        let url = Self::expand_template(template, location);
        info!("Sending after-stored callback...");
        self.get(&url).await?;
        Ok(())
    }
}
