//! Outbound email for final artifacts.
//!
//! Only artifacts with a receipt are ever attached; previews and drafts
//! never leave the machine. SMTP credentials come from configuration, and
//! a missing SMTP setup is a `Delivery` error, not a panic.

use lettre::message::{header, Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::{ArtifactKey, ArtifactReceipt};

pub struct Mailer {
    host: String,
    username: String,
    password: String,
    from: String,
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

impl Mailer {
    /// Build a mailer from configuration. Returns `Delivery` if any SMTP
    /// setting is missing, so callers can surface a clear operator message.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let missing = |name: &str| PipelineError::Delivery(format!("{name} is not configured"));
        Ok(Self {
            host: config.smtp_host.clone().ok_or_else(|| missing("smtp_host"))?,
            username: config
                .smtp_username
                .clone()
                .ok_or_else(|| missing("smtp_username"))?,
            password: config
                .smtp_password
                .clone()
                .ok_or_else(|| missing("smtp_password"))?,
            from: config.smtp_from.clone().ok_or_else(|| missing("smtp_from"))?,
        })
    }

    /// Send a final artifact as a PDF attachment.
    pub async fn send_artifact(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        key: &ArtifactKey,
        receipt: &ArtifactReceipt,
        pdf: Vec<u8>,
    ) -> Result<(), PipelineError> {
        let filename = format!(
            "{}_{}_{}.pdf",
            key.kind, key.record_id, receipt.short_checksum()
        );
        let content_type = header::ContentType::parse("application/pdf")
            .map_err(|e| PipelineError::Delivery(format!("content type: {e}")))?;

        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| PipelineError::Delivery(format!("from address: {e}")))?,
            )
            .to(recipient
                .parse()
                .map_err(|e| PipelineError::Delivery(format!("recipient address: {e}")))?)
            .subject(subject)
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(body.to_string()))
                    .singlepart(Attachment::new(filename).body(pdf, content_type)),
            )
            .map_err(|e| PipelineError::Delivery(format!("build message: {e}")))?;

        let creds = Credentials::new(self.username.clone(), self.password.clone());
        let mailer = SmtpTransport::relay(&self.host)
            .map_err(|e| PipelineError::Delivery(format!("smtp relay: {e}")))?
            .credentials(creds)
            .build();

        // lettre's sync transport blocks; keep it off the async workers.
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| PipelineError::Delivery(format!("send task: {e}")))?;
        result.map_err(|e| PipelineError::Delivery(format!("smtp send: {e}")))?;

        info!(recipient, checksum = %receipt.short_checksum(), "artifact emailed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_config() -> Config {
        Config {
            database_url: "postgres://unused".to_string(),
            artifact_dir: "artifacts".to_string(),
            compiler_cmd: "weasyprint".to_string(),
            compiler_timeout_secs: 30,
            compiler_max_concurrent: 4,
            compiler_queue_wait_secs: 10,
            db_timeout_secs: 10,
            smtp_host: None,
            smtp_username: None,
            smtp_password: None,
            smtp_from: None,
        }
    }

    #[test]
    fn missing_smtp_settings_are_a_delivery_error() {
        let err = Mailer::from_config(&bare_config()).unwrap_err();
        assert!(matches!(err, PipelineError::Delivery(ref m) if m.contains("smtp_host")));
    }
}
