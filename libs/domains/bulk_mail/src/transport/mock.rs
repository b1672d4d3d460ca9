//! Mock transport for testing and dry runs.

use super::{Addressee, MailTransport};
use crate::error::{BulkMailError, BulkMailResult};
use crate::models::{Bodies, Sender};
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::Mutex;

/// A batch the mock transport was asked to send.
#[derive(Debug, Clone)]
pub struct SentBatch {
    pub from: Sender,
    pub recipients: Vec<Addressee>,
    pub subject: String,
    pub bodies: Bodies,
    /// Whether the call was scripted to fail.
    pub failed: bool,
}

/// Transport that records every call and fails the calls it was told to.
#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<SentBatch>>,
    failing_calls: HashSet<usize>,
    always_fail: bool,
}

impl MockTransport {
    /// Create a mock transport that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock transport that rejects every batch.
    pub fn failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    /// Fail the given calls, counted from 1.
    pub fn failing_calls(calls: impl IntoIterator<Item = usize>) -> Self {
        Self {
            failing_calls: calls.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Every call made so far, failed ones included.
    pub async fn calls(&self) -> Vec<SentBatch> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// Addresses of every batch that was accepted.
    pub async fn delivered_to(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| !call.failed)
            .flat_map(|call| call.recipients.iter().map(|r| r.email.clone()))
            .collect()
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn send(
        &self,
        from: &Sender,
        batch: &[Addressee],
        subject: &str,
        bodies: &Bodies,
    ) -> BulkMailResult<usize> {
        let mut calls = self.calls.lock().await;
        let call_number = calls.len() + 1;
        let failed = self.always_fail || self.failing_calls.contains(&call_number);

        calls.push(SentBatch {
            from: from.clone(),
            recipients: batch.to_vec(),
            subject: subject.to_string(),
            bodies: bodies.clone(),
            failed,
        });

        if failed {
            return Err(BulkMailError::TransportError(format!(
                "Mock failure on call {}",
                call_number
            )));
        }
        Ok(batch.len())
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    async fn health_check(&self) -> BulkMailResult<bool> {
        Ok(!self.always_fail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> Vec<Addressee> {
        vec![Addressee::new("a@example.com", "A"), Addressee::new("b@example.com", "B")]
    }

    #[tokio::test]
    async fn test_mock_transport_records_batches() {
        let transport = MockTransport::new();
        let sender = Sender::new("news@example.com", "News");

        let delivered = transport
            .send(&sender, &batch(), "Hello", &Bodies::new())
            .await
            .unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(transport.call_count().await, 1);
        assert_eq!(transport.delivered_to().await, vec!["a@example.com", "b@example.com"]);
    }

    #[tokio::test]
    async fn test_mock_transport_fails_scripted_calls() {
        let transport = MockTransport::failing_calls([2]);
        let sender = Sender::new("news@example.com", "News");

        assert!(transport.send(&sender, &batch(), "s", &Bodies::new()).await.is_ok());
        assert!(transport.send(&sender, &batch(), "s", &Bodies::new()).await.is_err());
        assert!(transport.send(&sender, &batch(), "s", &Bodies::new()).await.is_ok());

        let calls = transport.calls().await;
        assert_eq!(calls.iter().filter(|c| c.failed).count(), 1);
        assert!(calls[1].failed);
    }

    #[tokio::test]
    async fn test_failing_mock_transport() {
        let transport = MockTransport::failing();
        let sender = Sender::new("news@example.com", "News");

        assert!(transport.send(&sender, &batch(), "s", &Bodies::new()).await.is_err());
        assert!(!transport.health_check().await.unwrap());
        assert!(transport.delivered_to().await.is_empty());
    }
}
