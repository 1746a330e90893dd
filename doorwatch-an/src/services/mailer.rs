//! Batch email delivery
//!
//! Sends one message with every flushed artifact attached. The SMTP
//! transport is created lazily and cached; a delivery failure drops the
//! cached transport so the next send starts from a fresh connection.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::types::Artifact;

const DEFAULT_RELAY: &str = "smtp.gmail.com";
const DEFAULT_SUBJECT: &str = "Front Door Motion";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Address error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Message build error: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("Attachment content type error: {0}")]
    ContentType(String),

    #[error("SMTP error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound mail seam
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one message with all files attached
    async fn send_batch(&self, files: &[Artifact]) -> Result<(), MailError>;
}

/// Mail settings; missing account, password, or recipient disables sending
#[derive(Debug, Clone, Default)]
pub struct MailSettings {
    pub account: Option<String>,
    pub password: Option<String>,
    pub recipient: Option<String>,
    pub relay: Option<String>,
    pub subject: Option<String>,
}

/// SMTP mailer (STARTTLS submission)
pub struct SmtpMailer {
    settings: MailSettings,
    transport: Mutex<Option<AsyncSmtpTransport<Tokio1Executor>>>,
}

impl SmtpMailer {
    pub fn new(settings: MailSettings) -> Self {
        Self {
            settings,
            transport: Mutex::new(None),
        }
    }

    fn configured(&self) -> Option<(&str, &str, &str)> {
        match (
            self.settings.account.as_deref(),
            self.settings.password.as_deref(),
            self.settings.recipient.as_deref(),
        ) {
            (Some(account), Some(password), Some(recipient)) => {
                Some((account, password, recipient))
            }
            _ => None,
        }
    }

    /// Build the message with each file as an attachment
    async fn build_message(
        &self,
        account: &str,
        recipient: &str,
        files: &[Artifact],
    ) -> Result<Message, MailError> {
        let mut multipart: Option<MultiPart> = None;
        for artifact in files {
            let bytes = artifact.read_bytes().await?;
            let mime = mime_guess::from_path(artifact.path()).first_or_octet_stream();
            let content_type = ContentType::parse(mime.as_ref())
                .map_err(|e| MailError::ContentType(e.to_string()))?;
            let part = Attachment::new(artifact.name().to_string()).body(bytes, content_type);
            multipart = Some(match multipart {
                Some(mp) => mp.singlepart(part),
                None => MultiPart::mixed().singlepart(part),
            });
        }
        let multipart = multipart.ok_or_else(|| {
            MailError::Transport("refusing to build an email with no attachments".to_string())
        })?;

        let subject = self
            .settings
            .subject
            .clone()
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

        Ok(Message::builder()
            .from(account.parse()?)
            .to(recipient.parse()?)
            .subject(subject)
            .multipart(multipart)?)
    }

    async fn transport(
        &self,
        account: &str,
        password: &str,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let mut guard = self.transport.lock().await;
        if guard.is_none() {
            let relay = self.settings.relay.as_deref().unwrap_or(DEFAULT_RELAY);
            let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(relay)
                .map_err(|e| MailError::Transport(e.to_string()))?
                .credentials(Credentials::new(account.to_string(), password.to_string()))
                .build();
            *guard = Some(transport);
        }
        Ok(guard.as_ref().expect("transport just cached").clone())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_batch(&self, files: &[Artifact]) -> Result<(), MailError> {
        let Some((account, password, recipient)) = self.configured() else {
            info!("Not sending email, not configured");
            return Ok(());
        };
        if files.is_empty() {
            return Ok(());
        }

        info!("Sending mail... {}", files[0].name());
        let message = self.build_message(account, recipient, files).await?;
        let transport = self.transport(account, password).await?;

        match transport.send(message).await {
            Ok(_) => Ok(()),
            Err(e) => {
                // Drop the cached transport; the next send reconnects
                self.transport.lock().await.take();
                Err(MailError::Transport(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn artifact_with_bytes(dir: &tempfile::TempDir, name: &str) -> Artifact {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"image data").unwrap();
        Artifact::new(path)
    }

    fn configured_mailer() -> SmtpMailer {
        SmtpMailer::new(MailSettings {
            account: Some("sender@example.com".to_string()),
            password: Some("secret".to_string()),
            recipient: Some("alerts@example.com".to_string()),
            relay: None,
            subject: None,
        })
    }

    #[tokio::test]
    async fn unconfigured_mailer_skips_quietly() {
        let mailer = SmtpMailer::new(MailSettings::default());
        let dir = tempfile::tempdir().unwrap();
        let files = vec![artifact_with_bytes(&dir, "a.jpg")];

        mailer.send_batch(&files).await.unwrap();
    }

    #[tokio::test]
    async fn message_attaches_every_file() {
        let mailer = configured_mailer();
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            artifact_with_bytes(&dir, "first.jpg"),
            artifact_with_bytes(&dir, "second.jpg"),
        ];

        let message = mailer
            .build_message("sender@example.com", "alerts@example.com", &files)
            .await
            .unwrap();

        let formatted = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(formatted.contains("first.jpg"));
        assert!(formatted.contains("second.jpg"));
        assert!(formatted.contains("Front Door Motion"));
    }

    #[tokio::test]
    async fn empty_batch_builds_no_message() {
        let mailer = configured_mailer();
        let result = mailer
            .build_message("sender@example.com", "alerts@example.com", &[])
            .await;
        assert!(result.is_err());
    }
}
