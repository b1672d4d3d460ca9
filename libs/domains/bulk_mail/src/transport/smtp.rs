//! SMTP transport using lettre.
//!
//! Each batch becomes one message whose recipients are all Bcc, so the
//! envelope carries the whole batch and no recipient sees the others.

use super::{Addressee, MailTransport};
use crate::error::{BulkMailError, BulkMailResult};
use crate::models::{Bodies, MIME_TEXT_HTML, MIME_TEXT_PLAIN, Sender};
use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_or_default, env_parse_or};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::{debug, error, info};

/// SMTP configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP server host.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// SMTP username (optional for dev servers like Mailpit).
    pub username: Option<String>,
    /// SMTP password (optional for dev servers like Mailpit).
    pub password: Option<String>,
    /// Whether to use TLS (false for local dev servers).
    pub use_tls: bool,
}

impl SmtpConfig {
    /// Create a new SMTP configuration without TLS or credentials.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            use_tls: false,
        }
    }

    /// Builder method to set TLS.
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Builder method to set credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

impl FromEnv for SmtpConfig {
    /// Read `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD` and
    /// `SMTP_USE_TLS`, defaulting to a local Mailpit on port 1025.
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or_default("SMTP_HOST", "localhost"),
            port: env_parse_or("SMTP_PORT", 1025u16)?,
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            use_tls: std::env::var("SMTP_USE_TLS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }
}

/// SMTP transport.
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: SmtpConfig,
}

impl SmtpTransport {
    /// Create a new SMTP transport.
    pub fn new(config: SmtpConfig) -> BulkMailResult<Self> {
        let transport = Self::build_transport(&config)?;
        Ok(Self { transport, config })
    }

    /// Create a transport from environment variables.
    pub fn from_env() -> BulkMailResult<Self> {
        Self::new(SmtpConfig::from_env()?)
    }

    fn build_transport(config: &SmtpConfig) -> BulkMailResult<AsyncSmtpTransport<Tokio1Executor>> {
        let credentials = match (&config.username, &config.password) {
            (Some(username), Some(password)) => Some(Credentials::new(username.clone(), password.clone())),
            _ => None,
        };

        let transport = if config.use_tls {
            let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?.port(config.port);
            if let Some(credentials) = credentials {
                builder = builder.credentials(credentials);
            }
            builder.build()
        } else {
            // plain connection for local dev servers like Mailpit
            let mut builder =
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(config.port);
            if let Some(credentials) = credentials {
                builder = builder.credentials(credentials);
            }
            builder.build()
        };

        Ok(transport)
    }

    fn mailbox(email: &str, name: &str) -> BulkMailResult<Mailbox> {
        let address = email
            .parse()
            .map_err(|e| BulkMailError::TransportError(format!("Invalid address '{}': {}", email, e)))?;
        let name = if name.is_empty() { None } else { Some(name.to_string()) };
        Ok(Mailbox::new(name, address))
    }

    /// Build the lettre message for one batch.
    pub(crate) fn build_message(
        from: &Sender,
        batch: &[Addressee],
        subject: &str,
        bodies: &Bodies,
    ) -> BulkMailResult<Message> {
        let mut builder = Message::builder()
            .from(Self::mailbox(&from.email, &from.name)?)
            .subject(subject);

        for addressee in batch {
            builder = builder.bcc(Self::mailbox(&addressee.email, &addressee.name)?);
        }

        let html = bodies.get(MIME_TEXT_HTML);
        let text = bodies.get(MIME_TEXT_PLAIN);

        let message = match (text, html) {
            (Some(text), Some(html)) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.clone()),
                    ),
            ),
            (None, Some(html)) => builder.singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(html.clone()),
            ),
            (Some(text), None) => builder.singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(text.clone()),
            ),
            (None, None) => {
                return Err(BulkMailError::TransportError(
                    "Message has no text/plain or text/html body".to_string(),
                ));
            }
        };

        message.map_err(|e| BulkMailError::TransportError(format!("Failed to build message: {}", e)))
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(
        &self,
        from: &Sender,
        batch: &[Addressee],
        subject: &str,
        bodies: &Bodies,
    ) -> BulkMailResult<usize> {
        debug!(
            recipients = batch.len(),
            subject = %subject,
            host = %self.config.host,
            port = %self.config.port,
            "Sending batch via SMTP"
        );

        let message = Self::build_message(from, batch, subject, bodies)?;

        let response = self.transport.send(message).await.map_err(|e| {
            error!(recipients = batch.len(), error = %e, "Failed to send batch via SMTP");
            BulkMailError::TransportError(format!("SMTP send failed: {}", e))
        })?;

        info!(
            recipients = batch.len(),
            code = %response.code(),
            "Batch accepted via SMTP"
        );

        Ok(batch.len())
    }

    fn name(&self) -> &'static str {
        "SMTP"
    }

    async fn health_check(&self) -> BulkMailResult<bool> {
        Ok(self.transport.test_connection().await?)
    }
}
