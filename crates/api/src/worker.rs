//! Queue workers feeding batches to consumers.

use std::sync::Arc;
use std::time::Duration;

use consumers::BatchConsumer;
use fanout::InMemoryQueue;
use tokio::sync::watch;

/// Counts from one receive-and-process cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tick {
    pub received: usize,
    pub acked: usize,
    pub released: usize,
    pub dead_lettered: usize,
}

/// Drives one consumer from one queue.
///
/// Successful items are acknowledged and failed items become visible again.
/// A message received more than `max_receive_count` times is moved to the
/// queue's dead-letter list without being processed.
pub struct QueueWorker {
    queue: InMemoryQueue,
    consumer: Arc<BatchConsumer>,
    batch_size: usize,
    max_receive_count: u32,
    poll_interval: Duration,
}

impl QueueWorker {
    pub fn new(queue: InMemoryQueue, consumer: Arc<BatchConsumer>) -> Self {
        Self {
            queue,
            consumer,
            batch_size: 10,
            max_receive_count: 5,
            poll_interval: Duration::from_millis(200),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_receive_count(mut self, max_receive_count: u32) -> Self {
        self.max_receive_count = max_receive_count;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn queue(&self) -> &InMemoryQueue {
        &self.queue
    }

    /// Receives one batch and processes it.
    #[tracing::instrument(skip(self), fields(queue = self.queue.name(), consumer = self.consumer.name()))]
    pub async fn tick(&self) -> Tick {
        let received = self.queue.receive_batch(self.batch_size).await;
        let mut tick = Tick {
            received: received.len(),
            ..Tick::default()
        };
        if received.is_empty() {
            return tick;
        }

        let mut batch = Vec::with_capacity(received.len());
        for message in received {
            if message.receive_count > self.max_receive_count {
                tracing::warn!(
                    message_id = %message.envelope.message_id,
                    receive_count = message.receive_count,
                    "Receive limit exceeded, moving to dead-letter list"
                );
                self.queue.dead_letter(&message.envelope.message_id).await;
                metrics::counter!("queue_dead_lettered", "queue" => self.queue.name().to_string())
                    .increment(1);
                tick.dead_lettered += 1;
            } else {
                batch.push(message.envelope);
            }
        }

        let report = self.consumer.process_batch(&batch).await;

        for envelope in &batch {
            if report.is_failed(&envelope.message_id) {
                self.queue.release(&envelope.message_id).await;
                tick.released += 1;
            } else {
                self.queue.ack(&envelope.message_id).await;
                tick.acked += 1;
            }
        }

        tick
    }

    /// Runs until `shutdown` flips to true, sleeping between empty polls.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(queue = self.queue.name(), "Queue worker started");

        while !*shutdown.borrow() {
            let tick = self.tick().await;
            if tick.received > 0 {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        tracing::info!(queue = self.queue.name(), "Queue worker stopped");
    }
}
