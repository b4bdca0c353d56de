//! Batch failure report.

use common::MessageId;
use domain::QueuedEnvelope;
use serde::{Deserialize, Serialize};

/// One failed item, identified by its transport message id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemFailure {
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: MessageId,
}

/// The ids of the items the transport must redeliver.
///
/// Serializes as `{"batchItemFailures":[{"itemIdentifier":"..."}]}`. An
/// empty list means every item succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    #[serde(rename = "batchItemFailures")]
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A report failing every envelope in the batch.
    pub fn all_failed(envelopes: &[QueuedEnvelope]) -> Self {
        let mut report = Self::new();
        for envelope in envelopes {
            report.push_failure(envelope.message_id.clone());
        }
        report
    }

    pub fn push_failure(&mut self, message_id: MessageId) {
        self.batch_item_failures.push(BatchItemFailure {
            item_identifier: message_id,
        });
    }

    pub fn failed_ids(&self) -> impl Iterator<Item = &MessageId> {
        self.batch_item_failures.iter().map(|f| &f.item_identifier)
    }

    pub fn is_failed(&self, message_id: &MessageId) -> bool {
        self.failed_ids().any(|id| id == message_id)
    }

    pub fn failure_count(&self) -> usize {
        self.batch_item_failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.batch_item_failures.is_empty()
    }
}
