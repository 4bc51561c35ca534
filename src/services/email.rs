use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use uuid::Uuid;

use crate::config::EmailConfig;
use crate::services::retry::{is_retryable_message, DeliveryError};

#[async_trait]
pub trait EmailProvider: Send + Sync + 'static {
    /// Send one message; returns the provider message id.
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        text: &str,
    ) -> Result<String, DeliveryError>;
}

/// SMTP delivery through a pooled STARTTLS relay connection.
pub struct SmtpEmailProvider {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailProvider {
    /// `None` when no SMTP host is configured.
    pub fn from_config(config: &EmailConfig) -> anyhow::Result<Option<Self>> {
        let Some(host) = config.smtp_host.as_deref() else {
            return Ok(None);
        };

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?.port(config.smtp_port);
        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Some(Self {
            mailer: builder.build(),
            from: config.from_address.parse()?,
        }))
    }

    fn message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
    }
}

fn classify_smtp(err: &lettre::transport::smtp::Error) -> DeliveryError {
    let detail = format!("smtp error: {}", err);
    if err.is_permanent() {
        DeliveryError::Permanent(detail)
    } else if err.is_transient() || err.is_timeout() || is_retryable_message(&detail) {
        DeliveryError::Transient(detail)
    } else if err.is_client() {
        DeliveryError::Permanent(detail)
    } else {
        // Connection and TLS failures.
        DeliveryError::Transient(detail)
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailProvider {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        text: &str,
    ) -> Result<String, DeliveryError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| DeliveryError::Permanent(format!("invalid recipient address: {}", e)))?;
        let message_id = self.message_id();

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .message_id(Some(message_id.clone()))
            .multipart(MultiPart::alternative_plain_html(
                text.to_string(),
                html.to_string(),
            ))
            .map_err(|e| DeliveryError::Permanent(format!("failed to build email: {}", e)))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| classify_smtp(&e))?;

        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: Option<&str>) -> EmailConfig {
        EmailConfig {
            smtp_host: host.map(str::to_string),
            smtp_port: 587,
            from_address: "Garden Planner <noreply@garden.local>".to_string(),
            smtp_user: None,
            smtp_password: None,
        }
    }

    #[test]
    fn unconfigured_host_yields_no_provider() {
        assert!(SmtpEmailProvider::from_config(&config(None)).unwrap().is_none());
    }

    #[tokio::test]
    async fn message_id_uses_sender_domain() {
        let provider = SmtpEmailProvider::from_config(&config(Some("smtp.example.com")))
            .unwrap()
            .unwrap();
        let id = provider.message_id();
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@garden.local>"));
    }

    #[tokio::test]
    async fn malformed_recipient_is_permanent() {
        let provider = SmtpEmailProvider::from_config(&config(Some("smtp.example.com")))
            .unwrap()
            .unwrap();
        let err = provider
            .send("not an address", "s", "<p>h</p>", "t")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Permanent(_)));
    }
}
