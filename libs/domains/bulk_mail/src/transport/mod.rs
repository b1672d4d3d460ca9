//! Mail transport implementations.
//!
//! This module contains the `MailTransport` trait and implementations for
//! the services a batch can be delivered through.

mod mock;
mod sendgrid;
mod smtp;

pub use mock::{MockTransport, SentBatch};
pub use sendgrid::{SendGridConfig, SendGridTransport};
pub use smtp::{SmtpConfig, SmtpTransport};

use crate::error::BulkMailResult;
use crate::models::{Bodies, Sender};
use async_trait::async_trait;

/// One entry of a batch: an address and the name shown for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addressee {
    pub email: String,
    pub name: String,
}

impl Addressee {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
        }
    }
}

/// Trait for immediate delivery of one batch.
///
/// Implementations include SMTP and SendGrid. A transport either accepts the
/// whole batch and reports how many recipients it delivered to, or fails.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver one message to every addressee of the batch.
    async fn send(
        &self,
        from: &Sender,
        batch: &[Addressee],
        subject: &str,
        bodies: &Bodies,
    ) -> BulkMailResult<usize>;

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;

    /// Check if the transport is reachable and configured.
    async fn health_check(&self) -> BulkMailResult<bool>;
}
