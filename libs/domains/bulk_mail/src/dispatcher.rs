//! Batched immediate delivery.
//!
//! A group is cut into fixed-size batches that go to the transport one at a
//! time. A failure before any batch got through aborts the group so the
//! caller can spool it whole. A failure after a success only skips that
//! batch: the group counts as delivered and is never spooled, because
//! spooling it would send the delivered batches a second time.

use crate::models::{Bodies, Recipient, Sender};
use crate::transport::{Addressee, MailTransport};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of dispatching one recipient group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// At least one batch was accepted.
    Delivered {
        /// Unique addresses across every batch.
        attempted: usize,
        /// Recipients the transport reported as delivered.
        delivered: usize,
        /// Batches that failed after the first success.
        failed_batches: usize,
    },
    /// No batch was accepted; the group should be spooled.
    Failed,
}

impl DispatchOutcome {
    pub fn delivered(&self) -> usize {
        match self {
            DispatchOutcome::Delivered { delivered, .. } => *delivered,
            DispatchOutcome::Failed => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DispatchOutcome::Failed)
    }
}

/// Ordered address to display-name mapping for a group.
///
/// An address keeps the position of its first occurrence; the name of its
/// last occurrence wins.
pub fn address_map(recipients: &[Recipient]) -> Vec<Addressee> {
    let mut entries: Vec<Addressee> = Vec::with_capacity(recipients.len());
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(recipients.len());

    for recipient in recipients {
        match positions.get(recipient.email.as_str()) {
            Some(&at) => entries[at].name = recipient.name.clone(),
            None => {
                positions.insert(recipient.email.as_str(), entries.len());
                entries.push(Addressee::new(&recipient.email, &recipient.name));
            }
        }
    }
    entries
}

/// Split into consecutive batches of at most `batch_size` entries.
pub fn batches(addressees: &[Addressee], batch_size: usize) -> impl Iterator<Item = &[Addressee]> {
    addressees.chunks(batch_size.max(1))
}

/// Sends recipient groups through a [`MailTransport`] in batches.
pub struct BatchDispatcher {
    transport: Arc<dyn MailTransport>,
    batch_size: usize,
}

impl BatchDispatcher {
    pub fn new(transport: Arc<dyn MailTransport>, batch_size: usize) -> Self {
        Self {
            transport,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Deliver `bodies` to every recipient, batch by batch.
    pub async fn dispatch(
        &self,
        from: &Sender,
        recipients: &[Recipient],
        subject: &str,
        bodies: &Bodies,
    ) -> DispatchOutcome {
        let addressees = address_map(recipients);
        let total_batches = addressees.len().div_ceil(self.batch_size);

        let mut delivered = 0;
        let mut succeeded_once = false;
        let mut failed_batches = 0;

        for (index, batch) in batches(&addressees, self.batch_size).enumerate() {
            match self.transport.send(from, batch, subject, bodies).await {
                Ok(count) => {
                    delivered += count;
                    succeeded_once = true;
                    debug!(
                        transport = self.transport.name(),
                        batch = index + 1,
                        total_batches,
                        delivered = count,
                        "Batch delivered"
                    );
                }
                Err(e) if !succeeded_once => {
                    warn!(
                        transport = self.transport.name(),
                        batch = index + 1,
                        total_batches,
                        error = %e,
                        "First batch failed, giving up on immediate delivery"
                    );
                    return DispatchOutcome::Failed;
                }
                Err(e) => {
                    failed_batches += 1;
                    warn!(
                        transport = self.transport.name(),
                        batch = index + 1,
                        total_batches,
                        recipients = batch.len(),
                        error = %e,
                        "Batch failed after earlier batches were delivered, continuing"
                    );
                }
            }
        }

        if !succeeded_once {
            // nothing to send is not a delivery
            return DispatchOutcome::Failed;
        }

        DispatchOutcome::Delivered {
            attempted: addressees.len(),
            delivered,
            failed_batches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MIME_TEXT_PLAIN;
    use crate::transport::MockTransport;

    fn recipients(n: usize) -> Vec<Recipient> {
        (1..=n)
            .map(|i| Recipient::new(i as i64, format!("user{}@example.com", i), format!("User {}", i)))
            .collect()
    }

    fn bodies() -> Bodies {
        let mut bodies = Bodies::new();
        bodies.insert(MIME_TEXT_PLAIN.to_string(), "hello".to_string());
        bodies
    }

    fn sender() -> Sender {
        Sender::new("news@example.com", "News")
    }

    #[test]
    fn test_address_map_last_name_wins_first_position_kept() {
        let input = vec![
            Recipient::new(1, "a@example.com", "First"),
            Recipient::new(2, "b@example.com", "B"),
            Recipient::new(3, "a@example.com", "Second"),
        ];

        let map = address_map(&input);
        assert_eq!(
            map,
            vec![
                Addressee::new("a@example.com", "Second"),
                Addressee::new("b@example.com", "B"),
            ]
        );
    }

    #[test]
    fn test_batch_counts() {
        for (n, b) in [(0, 3), (1, 3), (3, 3), (7, 3), (10, 1), (5, 100)] {
            let addressees = address_map(&recipients(n));
            let produced: Vec<&[Addressee]> = batches(&addressees, b).collect();

            assert_eq!(produced.len(), n.div_ceil(b), "n={} b={}", n, b);
            assert!(produced.iter().all(|batch| batch.len() <= b));
            assert_eq!(produced.iter().map(|batch| batch.len()).sum::<usize>(), n);

            // order preserved
            let flattened: Vec<&str> = produced
                .iter()
                .flat_map(|batch| batch.iter().map(|a| a.email.as_str()))
                .collect();
            let expected: Vec<&str> = addressees.iter().map(|a| a.email.as_str()).collect();
            assert_eq!(flattened, expected);
        }
    }

    #[tokio::test]
    async fn test_all_batches_delivered() {
        let transport = Arc::new(MockTransport::new());
        let dispatcher = BatchDispatcher::new(transport.clone(), 2);

        let outcome = dispatcher
            .dispatch(&sender(), &recipients(5), "Hello", &bodies())
            .await;

        assert_eq!(
            outcome,
            DispatchOutcome::Delivered {
                attempted: 5,
                delivered: 5,
                failed_batches: 0
            }
        );
        assert_eq!(transport.call_count().await, 3);
    }

    #[tokio::test]
    async fn test_failure_after_success_continues_and_is_not_failed() {
        let transport = Arc::new(MockTransport::failing_calls([2]));
        let dispatcher = BatchDispatcher::new(transport.clone(), 2);

        let outcome = dispatcher
            .dispatch(&sender(), &recipients(4), "Hello", &bodies())
            .await;

        assert_eq!(
            outcome,
            DispatchOutcome::Delivered {
                attempted: 4,
                delivered: 2,
                failed_batches: 1
            }
        );
        assert_eq!(outcome.delivered(), 2);
        assert_eq!(transport.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_later_batches_still_attempted_after_mid_failure() {
        let transport = Arc::new(MockTransport::failing_calls([2]));
        let dispatcher = BatchDispatcher::new(transport.clone(), 1);

        let outcome = dispatcher
            .dispatch(&sender(), &recipients(3), "Hello", &bodies())
            .await;

        assert_eq!(outcome.delivered(), 2);
        assert_eq!(transport.call_count().await, 3);
        assert_eq!(
            transport.delivered_to().await,
            vec!["user1@example.com", "user3@example.com"]
        );
    }

    #[tokio::test]
    async fn test_first_batch_failure_aborts() {
        let transport = Arc::new(MockTransport::failing_calls([1]));
        let dispatcher = BatchDispatcher::new(transport.clone(), 2);

        let outcome = dispatcher
            .dispatch(&sender(), &recipients(6), "Hello", &bodies())
            .await;

        assert!(outcome.is_failed());
        assert_eq!(outcome.delivered(), 0);
        // no further batches after the abort
        assert_eq!(transport.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_empty_group_is_failed_without_calls() {
        let transport = Arc::new(MockTransport::new());
        let dispatcher = BatchDispatcher::new(transport.clone(), 2);

        let outcome = dispatcher.dispatch(&sender(), &[], "Hello", &bodies()).await;

        assert!(outcome.is_failed());
        assert_eq!(transport.call_count().await, 0);
    }
}
