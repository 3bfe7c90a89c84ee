//! Outbound email delivery over SMTP.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::config::SmtpConfig;
use crate::error::DeliveryError;

/// Abstraction over email delivery so the scheduler and auth flows can be
/// tested without a live SMTP server.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), DeliveryError>;
}

/// SMTP mailer backed by lettre's async transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    send_timeout: Duration,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| DeliveryError::Build(format!("SMTP relay setup failed: {e}")))?
            .port(config.port)
            .credentials(creds)
            .build();

        info!(host = %config.host, port = config.port, "SMTP transport configured");

        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
            send_timeout: Duration::from_secs(config.send_timeout_secs),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), DeliveryError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|e| DeliveryError::InvalidAddress(format!("from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| DeliveryError::InvalidAddress(format!("to address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| DeliveryError::Build(format!("message build failed: {e}")))?;

        let seconds = self.send_timeout.as_secs();
        match tokio::time::timeout(self.send_timeout, self.transport.send(message)).await {
            Ok(Ok(_)) => {
                debug!(to = %to, subject = %subject, "Email sent");
                Ok(())
            }
            Ok(Err(e)) => Err(DeliveryError::Smtp(format!("SMTP send failed: {e}"))),
            Err(_) => Err(DeliveryError::Timeout { seconds }),
        }
    }
}
