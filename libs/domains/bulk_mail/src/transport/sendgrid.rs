//! SendGrid transport.
//!
//! A batch is sent as one API call with one personalization per recipient,
//! which keeps recipients from seeing each other.

use super::{Addressee, MailTransport};
use crate::error::{BulkMailError, BulkMailResult};
use crate::models::{Bodies, MIME_TEXT_HTML, MIME_TEXT_PLAIN, Sender};
use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_required};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// SendGrid API configuration.
#[derive(Debug, Clone)]
pub struct SendGridConfig {
    /// SendGrid API key.
    pub api_key: String,
    /// SendGrid API base URL (defaults to production).
    pub api_url: String,
}

impl SendGridConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: "https://api.sendgrid.com/v3".to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

impl FromEnv for SendGridConfig {
    /// Requires `SENDGRID_API_KEY`.
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(env_required("SENDGRID_API_KEY")?))
    }
}

/// SendGrid transport.
pub struct SendGridTransport {
    config: SendGridConfig,
    client: Client,
}

impl SendGridTransport {
    pub fn new(config: SendGridConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn from_env() -> BulkMailResult<Self> {
        Ok(Self::new(SendGridConfig::from_env()?))
    }

    fn build_request(
        from: &Sender,
        batch: &[Addressee],
        subject: &str,
        bodies: &Bodies,
    ) -> BulkMailResult<SendGridRequest> {
        // SendGrid wants text/plain before text/html
        let content: Vec<Content> = [MIME_TEXT_PLAIN, MIME_TEXT_HTML]
            .into_iter()
            .filter_map(|mime| {
                bodies.get(mime).map(|value| Content {
                    content_type: mime.to_string(),
                    value: value.clone(),
                })
            })
            .collect();

        if content.is_empty() {
            return Err(BulkMailError::TransportError(
                "Message has no text/plain or text/html body".to_string(),
            ));
        }

        Ok(SendGridRequest {
            personalizations: batch
                .iter()
                .map(|addressee| Personalization {
                    to: vec![EmailAddress::new(&addressee.email, &addressee.name)],
                })
                .collect(),
            from: EmailAddress::new(&from.email, &from.name),
            subject: subject.to_string(),
            content,
        })
    }
}

// SendGrid API request/response structures

#[derive(Debug, Serialize)]
struct SendGridRequest {
    personalizations: Vec<Personalization>,
    from: EmailAddress,
    subject: String,
    content: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Personalization {
    to: Vec<EmailAddress>,
}

#[derive(Debug, Serialize)]
struct EmailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl EmailAddress {
    fn new(email: &str, name: &str) -> Self {
        Self {
            email: email.to_string(),
            name: if name.is_empty() { None } else { Some(name.to_string()) },
        }
    }
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(rename = "type")]
    content_type: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct SendGridError {
    errors: Vec<SendGridErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct SendGridErrorDetail {
    message: String,
}

#[async_trait]
impl MailTransport for SendGridTransport {
    async fn send(
        &self,
        from: &Sender,
        batch: &[Addressee],
        subject: &str,
        bodies: &Bodies,
    ) -> BulkMailResult<usize> {
        let request = Self::build_request(from, batch, subject, bodies)?;

        debug!(
            recipients = batch.len(),
            subject = %subject,
            "Sending batch via SendGrid"
        );

        let response = self
            .client
            .post(format!("{}/mail/send", self.config.api_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let message_id = response
                .headers()
                .get("x-message-id")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            info!(
                recipients = batch.len(),
                message_id = ?message_id,
                "Batch accepted via SendGrid"
            );
            return Ok(batch.len());
        }

        let error_body = response.text().await.unwrap_or_default();
        error!(
            recipients = batch.len(),
            status = %status,
            error = %error_body,
            "Failed to send batch via SendGrid"
        );

        let error_message = match serde_json::from_str::<SendGridError>(&error_body) {
            Ok(sg_error) => sg_error
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join(", "),
            Err(_) => error_body,
        };

        Err(BulkMailError::TransportError(format!(
            "SendGrid error ({}): {}",
            status, error_message
        )))
    }

    fn name(&self) -> &'static str {
        "SendGrid"
    }

    async fn health_check(&self) -> BulkMailResult<bool> {
        // no health endpoint, so only the key format is checked
        if self.config.api_key.starts_with("SG.") {
            Ok(true)
        } else {
            Err(BulkMailError::ConfigError(
                "Invalid SendGrid API key format".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sendgrid_config_new() {
        let config = SendGridConfig::new("SG.test_key");
        assert_eq!(config.api_key, "SG.test_key");
        assert_eq!(config.api_url, "https://api.sendgrid.com/v3");
    }

    #[test]
    fn test_sendgrid_config_from_env_requires_key() {
        temp_env::with_var_unset("SENDGRID_API_KEY", || {
            let err = SendGridConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("SENDGRID_API_KEY"));
        });
    }

    #[test]
    fn test_request_has_one_personalization_per_recipient() {
        let mut bodies = Bodies::new();
        bodies.insert(MIME_TEXT_HTML.to_string(), "<p>hi</p>".to_string());
        bodies.insert(MIME_TEXT_PLAIN.to_string(), "hi".to_string());

        let request = SendGridTransport::build_request(
            &Sender::new("news@example.com", "News"),
            &[
                Addressee::new("a@example.com", "Alice"),
                Addressee::new("b@example.com", ""),
            ],
            "Hello",
            &bodies,
        )
        .unwrap();

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["personalizations"].as_array().unwrap().len(), 2);
        assert_eq!(json["personalizations"][0]["to"][0]["name"], "Alice");
        assert!(json["personalizations"][1]["to"][0].get("name").is_none());
        assert_eq!(json["content"][0]["type"], MIME_TEXT_PLAIN);
        assert_eq!(json["content"][1]["type"], MIME_TEXT_HTML);
    }

    #[tokio::test]
    async fn test_health_check_validates_key_format() {
        let transport = SendGridTransport::new(SendGridConfig::new("not-a-key"));
        assert!(transport.health_check().await.is_err());

        let transport = SendGridTransport::new(SendGridConfig::new("SG.abc"));
        assert!(transport.health_check().await.unwrap());
    }
}
