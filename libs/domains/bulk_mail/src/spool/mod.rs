//! Durable spool for groups that are not delivered immediately.
//!
//! The spool store is owned by a separate retry process; this crate only
//! creates records in it.

pub mod redis_store;

pub use redis_store::{RedisSpoolConfig, RedisSpoolStore};

use crate::error::BulkMailResult;
use crate::models::{Priority, Recipient, Sender, SpoolRecord};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Write access to the durable retry store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpoolStore: Send + Sync {
    /// Persist a record. Returns the identity the store assigned, or `None`
    /// when the store accepted the call without persisting anything.
    async fn create_record(&self, record: &SpoolRecord) -> BulkMailResult<Option<String>>;

    /// Get the store name for logging.
    fn name(&self) -> &'static str;
}

/// Turns a recipient group into one [`SpoolRecord`].
pub struct FallbackSpooler {
    store: Arc<dyn SpoolStore>,
}

impl FallbackSpooler {
    pub fn new(store: Arc<dyn SpoolStore>) -> Self {
        Self { store }
    }

    /// Spool every recipient of a group under one record.
    ///
    /// Returns the number of recipients in the record, or `None` if the
    /// store failed or did not assign the record an identity.
    pub async fn spool(
        &self,
        recipients: &[Recipient],
        body: &str,
        sender: &Sender,
        subject: &str,
        priority: Priority,
    ) -> Option<usize> {
        let record = SpoolRecord::new(sender, recipients, subject, body, priority);

        match self.store.create_record(&record).await {
            Ok(Some(identity)) => {
                debug!(
                    store = self.store.name(),
                    record_id = %record.id,
                    identity = %identity,
                    recipients = record.recipients.len(),
                    "Spooled recipient group"
                );
                Some(record.recipients.len())
            }
            Ok(None) => {
                error!(
                    store = self.store.name(),
                    record_id = %record.id,
                    "Spool store did not persist the record"
                );
                None
            }
            Err(e) => {
                error!(
                    store = self.store.name(),
                    record_id = %record.id,
                    error = %e,
                    "Failed to spool recipient group"
                );
                None
            }
        }
    }
}

/// Spool store that keeps records in memory.
#[derive(Default)]
pub struct InMemorySpoolStore {
    records: Mutex<Vec<SpoolRecord>>,
}

impl InMemorySpoolStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<SpoolRecord> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl SpoolStore for InMemorySpoolStore {
    async fn create_record(&self, record: &SpoolRecord) -> BulkMailResult<Option<String>> {
        let mut records = self.records.lock().await;
        records.push(record.clone());
        Ok(Some(records.len().to_string()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BulkMailError;

    fn recipients() -> Vec<Recipient> {
        vec![
            Recipient::new(1, "a@example.com", "A").with_format("text"),
            Recipient::new(2, "b@example.com", "B"),
        ]
    }

    fn sender() -> Sender {
        Sender::new("news@example.com", "News").with_id(5)
    }

    #[tokio::test]
    async fn test_spool_creates_one_record_for_the_group() {
        let store = Arc::new(InMemorySpoolStore::new());
        let spooler = FallbackSpooler::new(store.clone());

        let spooled = spooler
            .spool(&recipients(), "plain body", &sender(), "Hello", Priority::Low)
            .await;

        assert_eq!(spooled, Some(2));
        let records = store.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].body, "plain body");
        assert_eq!(records[0].sender_id, Some(5));
        assert_eq!(records[0].priority, Priority::Low);
        assert_eq!(records[0].recipients[0].format, "text");
        assert_eq!(records[0].recipients[1].format, "html");
    }

    #[tokio::test]
    async fn test_store_error_is_reported_as_none() {
        let mut store = MockSpoolStore::new();
        store
            .expect_create_record()
            .times(1)
            .returning(|_| Err(BulkMailError::SpoolError("connection refused".to_string())));
        store.expect_name().return_const("mock");

        let spooler = FallbackSpooler::new(Arc::new(store));
        let spooled = spooler
            .spool(&recipients(), "body", &sender(), "Hello", Priority::Low)
            .await;

        assert_eq!(spooled, None);
    }

    #[tokio::test]
    async fn test_record_without_identity_is_reported_as_none() {
        let mut store = MockSpoolStore::new();
        store.expect_create_record().times(1).returning(|_| Ok(None));
        store.expect_name().return_const("mock");

        let spooler = FallbackSpooler::new(Arc::new(store));
        let spooled = spooler
            .spool(&recipients(), "body", &sender(), "Hello", Priority::Low)
            .await;

        assert_eq!(spooled, None);
    }

    #[tokio::test]
    async fn test_record_carries_every_recipient() {
        let mut store = MockSpoolStore::new();
        store
            .expect_create_record()
            .withf(|record| {
                record.recipients.len() == 2
                    && record.subject == "Hello"
                    && record.sender_email == "news@example.com"
            })
            .times(1)
            .returning(|_| Ok(Some("1-0".to_string())));
        store.expect_name().return_const("mock");

        let spooler = FallbackSpooler::new(Arc::new(store));
        assert_eq!(
            spooler
                .spool(&recipients(), "body", &sender(), "Hello", Priority::Normal)
                .await,
            Some(2)
        );
    }
}
