//! Email delivery of the evidence archive

use crate::config::EmailSettings;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Invalid email address '{address}': {source}")]
    Address {
        address: String,
        source: lettre::address::AddressError,
    },

    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Invalid content type: {0}")]
    ContentType(String),

    #[error("Failed to read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Ships a finished run's archive somewhere a human will see it
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Returns `Ok(false)` when delivery is switched off.
    async fn deliver(&self, archive: &Path, stamp: &str) -> Result<bool, DeliveryError>;
}

/// Sends the archive as an attachment over implicit-TLS SMTP
pub struct SmtpDelivery {
    settings: EmailSettings,
}

impl SmtpDelivery {
    pub fn new(settings: EmailSettings) -> Self {
        Self { settings }
    }

    pub fn subject(&self, stamp: &str) -> String {
        self.settings.subject.replace("{timestamp}", stamp)
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, DeliveryError> {
        Ok(
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.settings.smtp_server)?
                .port(self.settings.smtp_port)
                .credentials(Credentials::new(
                    self.settings.sender_email.clone(),
                    self.settings.sender_password.clone(),
                ))
                .timeout(Some(Duration::from_secs(self.settings.timeout_secs)))
                .build(),
        )
    }

    pub fn compose(
        &self,
        attachment: Vec<u8>,
        file_name: &str,
        stamp: &str,
    ) -> Result<Message, DeliveryError> {
        let zip_type = ContentType::parse("application/zip")
            .map_err(|e| DeliveryError::ContentType(e.to_string()))?;
        let message = Message::builder()
            .from(mailbox(&self.settings.sender_email)?)
            .to(mailbox(&self.settings.recipient_email)?)
            .subject(self.subject(stamp))
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(self.settings.body.clone()))
                    .singlepart(Attachment::new(file_name.to_string()).body(attachment, zip_type)),
            )?;
        Ok(message)
    }

    /// Connect and authenticate without sending anything.
    #[instrument(skip(self), fields(server = %self.settings.smtp_server))]
    pub async fn test_connection(&self) -> Result<bool, DeliveryError> {
        Ok(self.transport()?.test_connection().await?)
    }
}

#[async_trait]
impl Delivery for SmtpDelivery {
    async fn deliver(&self, archive: &Path, stamp: &str) -> Result<bool, DeliveryError> {
        if !self.settings.send_email {
            info!("Email delivery disabled; archive left at {}", archive.display());
            return Ok(false);
        }

        let bytes = tokio::fs::read(archive)
            .await
            .map_err(|source| DeliveryError::Attachment {
                path: archive.to_path_buf(),
                source,
            })?;
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| crate::archive::archive_name(stamp));

        let message = self.compose(bytes, &file_name, stamp)?;
        self.transport()?.send(message).await?;
        info!("Report sent to {}", self.settings.recipient_email);
        Ok(true)
    }
}

fn mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address.parse().map_err(|source| DeliveryError::Address {
        address: address.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EmailSettings {
        EmailSettings {
            sender_email: "monitor@example.com".to_string(),
            recipient_email: "ops@example.com".to_string(),
            ..EmailSettings::default()
        }
    }

    #[test]
    fn test_subject_placeholder() {
        let delivery = SmtpDelivery::new(settings());
        assert_eq!(
            delivery.subject("20240309_070501"),
            "收银台监控报告 - 20240309_070501"
        );
    }

    #[test]
    fn test_compose_attaches_zip() {
        let delivery = SmtpDelivery::new(settings());
        let message = delivery
            .compose(b"PK\x03\x04".to_vec(), "cashier_screenshots_1.zip", "1")
            .unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();
        assert!(raw.contains("application/zip"));
        assert!(raw.contains("cashier_screenshots_1.zip"));
        assert!(raw.contains("ops@example.com"));
    }

    #[test]
    fn test_bad_recipient() {
        let delivery = SmtpDelivery::new(EmailSettings {
            recipient_email: "not an address".to_string(),
            ..settings()
        });
        assert!(matches!(
            delivery.compose(Vec::new(), "a.zip", "1"),
            Err(DeliveryError::Address { .. })
        ));
    }

    #[tokio::test]
    async fn test_disabled_is_noop() {
        let delivery = SmtpDelivery::new(EmailSettings::default());
        let sent = delivery
            .deliver(Path::new("/nonexistent/archive.zip"), "1")
            .await
            .unwrap();
        assert!(!sent);
    }
}
