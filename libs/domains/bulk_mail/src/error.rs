//! Error types for the bulk mail domain.

use thiserror::Error;

/// Result type for bulk mail operations.
pub type BulkMailResult<T> = Result<T, BulkMailError>;

/// Errors that can occur while sending bulk mail.
///
/// Only the validation, environment-safety, content and template variants
/// ever reach the caller of [`crate::BulkMailer::send`]. Transport and spool
/// errors are absorbed by the orchestrator and show up as a lower count.
#[derive(Debug, Error)]
pub enum BulkMailError {
    /// No recipient collection was supplied.
    #[error("Recipients are required")]
    MissingRecipients,

    /// No sender was supplied, or the sender has no valid address.
    #[error("A sender with a valid address is required")]
    MissingSender,

    /// No subject was supplied.
    #[error("Subject is required")]
    MissingSubject,

    /// A recipient reference could not be resolved.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// The non-production recipient override left nobody to send to.
    #[error("No recipients left after applying the non-production recipient policy")]
    NoRecipientsResolved,

    /// A recipient group was built with an unknown content format.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Template rendering error.
    #[error("Template rendering error: {0}")]
    TemplateError(String),

    /// Recipient directory lookup failed.
    #[error("Directory error: {0}")]
    DirectoryError(String),

    /// Mail transport error.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Durable spool store error.
    #[error("Spool error: {0}")]
    SpoolError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BulkMailError {
    /// Whether the error is raised before any side effect happens.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BulkMailError::MissingRecipients
                | BulkMailError::MissingSender
                | BulkMailError::MissingSubject
                | BulkMailError::InvalidRecipient(_)
        )
    }
}

impl From<redis::RedisError> for BulkMailError {
    fn from(err: redis::RedisError) -> Self {
        BulkMailError::SpoolError(err.to_string())
    }
}

impl From<handlebars::RenderError> for BulkMailError {
    fn from(err: handlebars::RenderError) -> Self {
        BulkMailError::TemplateError(err.to_string())
    }
}

impl From<handlebars::TemplateError> for BulkMailError {
    fn from(err: handlebars::TemplateError) -> Self {
        BulkMailError::TemplateError(err.to_string())
    }
}

impl From<reqwest::Error> for BulkMailError {
    fn from(err: reqwest::Error) -> Self {
        BulkMailError::TransportError(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for BulkMailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        BulkMailError::TransportError(format!("SMTP error: {}", err))
    }
}

impl From<serde_json::Error> for BulkMailError {
    fn from(err: serde_json::Error) -> Self {
        BulkMailError::Internal(format!("JSON serialization error: {}", err))
    }
}

impl From<core_config::ConfigError> for BulkMailError {
    fn from(err: core_config::ConfigError) -> Self {
        BulkMailError::ConfigError(err.to_string())
    }
}
