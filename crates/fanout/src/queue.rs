//! In-memory at-least-once queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use common::MessageId;
use domain::QueuedEnvelope;
use tokio::sync::Mutex;

/// A message handed to a consumer.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub envelope: QueuedEnvelope,
    /// How many times the message has been received, this time included.
    pub receive_count: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<ReceivedMessage>,
    in_flight: HashMap<MessageId, ReceivedMessage>,
    dead_letters: Vec<ReceivedMessage>,
}

/// In-memory queue with visibility semantics.
///
/// Received messages stay in flight until acknowledged or released. A
/// released message becomes visible again at the back of the queue.
#[derive(Debug, Clone)]
pub struct InMemoryQueue {
    name: Arc<str>,
    state: Arc<Mutex<QueueState>>,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            state: Arc::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueues an envelope.
    pub async fn send(&self, envelope: QueuedEnvelope) {
        self.state.lock().await.ready.push_back(ReceivedMessage {
            envelope,
            receive_count: 0,
        });
    }

    /// Takes up to `max` visible messages and marks them in flight.
    pub async fn receive_batch(&self, max: usize) -> Vec<ReceivedMessage> {
        let mut state = self.state.lock().await;
        let take = max.min(state.ready.len());

        let batch: Vec<ReceivedMessage> = state
            .ready
            .drain(..take)
            .map(|mut message| {
                message.receive_count += 1;
                message
            })
            .collect();

        for message in &batch {
            state
                .in_flight
                .insert(message.envelope.message_id.clone(), message.clone());
        }
        batch
    }

    /// Deletes an in-flight message. Returns false if it was not in flight.
    pub async fn ack(&self, message_id: &MessageId) -> bool {
        self.state.lock().await.in_flight.remove(message_id).is_some()
    }

    /// Makes an in-flight message visible again.
    pub async fn release(&self, message_id: &MessageId) -> bool {
        let mut state = self.state.lock().await;
        match state.in_flight.remove(message_id) {
            Some(message) => {
                state.ready.push_back(message);
                true
            }
            None => false,
        }
    }

    /// Moves an in-flight message to the dead-letter list.
    pub async fn dead_letter(&self, message_id: &MessageId) -> bool {
        let mut state = self.state.lock().await;
        match state.in_flight.remove(message_id) {
            Some(message) => {
                state.dead_letters.push(message);
                true
            }
            None => false,
        }
    }

    /// Number of visible messages.
    pub async fn len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.ready.is_empty()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    pub async fn dead_letters(&self) -> Vec<ReceivedMessage> {
        self.state.lock().await.dead_letters.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(id: &str) -> QueuedEnvelope {
        QueuedEnvelope::direct(id, r#"{"event_type":"order_created"}"#)
    }

    #[tokio::test]
    async fn test_receive_ack_release() {
        let queue = InMemoryQueue::new("orders");
        for id in ["m-1", "m-2", "m-3"] {
            queue.send(envelope(id)).await;
        }

        let batch = queue.receive_batch(2).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].receive_count, 1);
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.in_flight_len().await, 2);

        assert!(queue.ack(&MessageId::from("m-1")).await);
        assert!(queue.release(&MessageId::from("m-2")).await);
        assert!(!queue.ack(&MessageId::from("m-1")).await);

        let batch = queue.receive_batch(10).await;
        let ids: Vec<&str> = batch.iter().map(|m| m.envelope.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m-3", "m-2"]);
        assert_eq!(batch[1].receive_count, 2);
    }

    #[tokio::test]
    async fn test_dead_letter() {
        let queue = InMemoryQueue::new("orders");
        queue.send(envelope("m-1")).await;
        queue.receive_batch(1).await;

        assert!(queue.dead_letter(&MessageId::from("m-1")).await);
        assert!(queue.is_empty().await);
        assert_eq!(queue.in_flight_len().await, 0);
        assert_eq!(queue.dead_letters().await.len(), 1);
    }
}
