//! Kafka integration module for kiosk events
//!
//! This module provides:
//! - An [`EventStream`] abstraction over the broker with explicit commits
//! - The rdkafka-backed [`KafkaEventStream`]
//! - Per-message processing (decode, validate, resolve, persist)
//! - The backfill/live ingest loop with graceful shutdown

pub mod config;
mod consumer;
mod ingest;
mod processor;

pub use config::KafkaConfig;
pub use consumer::KafkaEventStream;
pub use ingest::{shutdown_signal, IngestLoop, LoopSettings, LoopStats, Phase};
pub use processor::{MessageProcessor, ProcessingResult};

use async_trait::async_trait;
use rdkafka::error::KafkaError;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Kafka-specific error types
#[derive(Debug, Error)]
pub enum KafkaIntegrationError {
    #[error("Kafka connection error: {0}")]
    ConnectionError(#[from] KafkaError),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Offset commit failed: {0}")]
    OffsetCommitError(String),
}

impl From<KafkaIntegrationError> for crate::error::Error {
    fn from(err: KafkaIntegrationError) -> Self {
        use crate::error::Error;

        match err {
            KafkaIntegrationError::OffsetCommitError(msg) => Error::OffsetCommit(msg),
            other => Error::broker(other.to_string()),
        }
    }
}

/// A message read from the stream, detached from the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
    pub timestamp: Option<i64>,
}

impl StreamMessage {
    /// Payload bytes, empty when the message had none
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }

    /// Payload for log lines, lossily decoded
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(self.payload_bytes()).into_owned()
    }
}

/// What a single poll returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// A message to process
    Message(StreamMessage),
    /// The partition has no more messages for now
    EndOfPartition { partition: i32 },
    /// Nothing arrived within the poll timeout
    Idle,
}

/// Offsets of finalized messages waiting to be committed
///
/// Stores the next offset to read per topic-partition, i.e. the last
/// finalized offset plus one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetBatch {
    offsets: BTreeMap<(String, i32), i64>,
    messages: usize,
}

impl OffsetBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message whose outcome is final
    pub fn track(&mut self, message: &StreamMessage) {
        let next = message.offset + 1;
        self.offsets
            .entry((message.topic.clone(), message.partition))
            .and_modify(|offset| *offset = (*offset).max(next))
            .or_insert(next);
        self.messages += 1;
    }

    /// Number of messages tracked since the batch was created
    pub fn len(&self) -> usize {
        self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages == 0
    }

    /// Next offset to read for a topic-partition, if any message was tracked
    pub fn next_offset(&self, topic: &str, partition: i32) -> Option<i64> {
        self.offsets.get(&(topic.to_string(), partition)).copied()
    }

    /// Iterate over (topic, partition, next offset)
    pub fn iter(&self) -> impl Iterator<Item = (&str, i32, i64)> {
        self.offsets
            .iter()
            .map(|((topic, partition), offset)| (topic.as_str(), *partition, *offset))
    }
}

/// Source of kiosk messages with explicit offset commits
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Wait up to `timeout` for the next event
    async fn poll(&self, timeout: Duration) -> Result<PollEvent, KafkaIntegrationError>;

    /// Commit every offset in the batch synchronously
    async fn commit(&self, batch: &OffsetBatch) -> Result<(), KafkaIntegrationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(partition: i32, offset: i64) -> StreamMessage {
        StreamMessage {
            topic: "lmnh".to_string(),
            partition,
            offset,
            payload: Some(b"{}".to_vec()),
            timestamp: None,
        }
    }

    #[test]
    fn test_offset_batch_tracks_next_offset() {
        let mut batch = OffsetBatch::new();
        assert!(batch.is_empty());

        batch.track(&message(0, 10));
        batch.track(&message(0, 11));
        batch.track(&message(1, 3));

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.next_offset("lmnh", 0), Some(12));
        assert_eq!(batch.next_offset("lmnh", 1), Some(4));
        assert_eq!(batch.next_offset("lmnh", 2), None);
        assert_eq!(batch.iter().count(), 2);
    }

    #[test]
    fn test_offset_batch_never_moves_backwards() {
        let mut batch = OffsetBatch::new();
        batch.track(&message(0, 20));
        batch.track(&message(0, 5));

        assert_eq!(batch.next_offset("lmnh", 0), Some(21));
    }

    #[test]
    fn test_payload_helpers() {
        let mut msg = message(0, 0);
        assert_eq!(msg.payload_text(), "{}");

        msg.payload = None;
        assert!(msg.payload_bytes().is_empty());
    }

    #[test]
    fn test_error_conversion() {
        let err: crate::error::Error =
            KafkaIntegrationError::OffsetCommitError("broker down".to_string()).into();
        assert_eq!(err.kind(), "offset_commit");

        let err: crate::error::Error = KafkaIntegrationError::Broker("down".to_string()).into();
        assert_eq!(err.to_string(), "Kafka broker error: Broker error: down");
    }
}
