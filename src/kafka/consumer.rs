//! rdkafka-backed event stream with manual offset management

use super::{EventStream, KafkaConfig, KafkaIntegrationError, OffsetBatch, PollEvent, StreamMessage};
use crate::error::Result;
use anyhow::anyhow;
use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::Offset;
use std::time::Duration;
use tracing::{debug, info};

/// Consumer subscribed to the kiosk topic
pub struct KafkaEventStream {
    /// Kafka consumer instance
    consumer: StreamConsumer,

    /// Subscribed topic
    topic: String,
}

impl KafkaEventStream {
    /// Create the consumer and subscribe to the configured topic
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let consumer: StreamConsumer = config
            .build_consumer_config()
            .create()
            .map_err(|e| anyhow!("Failed to create Kafka consumer: {}", e))?;

        consumer
            .subscribe(&[&config.topic])
            .map_err(|e| anyhow!("Failed to subscribe to topic: {}", e))?;

        info!(
            topic = %config.topic,
            group_id = %config.group_id,
            "Subscribed to Kafka topic"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }

    /// Topic this stream reads from
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl EventStream for KafkaEventStream {
    async fn poll(
        &self,
        timeout: Duration,
    ) -> std::result::Result<PollEvent, KafkaIntegrationError> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Ok(PollEvent::Idle),
            Ok(Ok(message)) => Ok(PollEvent::Message(detach(&message))),
            Ok(Err(KafkaError::PartitionEOF(partition))) => {
                Ok(PollEvent::EndOfPartition { partition })
            },
            Ok(Err(e)) => Err(KafkaIntegrationError::Broker(e.to_string())),
        }
    }

    async fn commit(&self, batch: &OffsetBatch) -> std::result::Result<(), KafkaIntegrationError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut offsets = TopicPartitionList::new();
        for (topic, partition, next_offset) in batch.iter() {
            offsets.add_partition_offset(topic, partition, Offset::Offset(next_offset))?;
        }

        self.consumer
            .commit(&offsets, CommitMode::Sync)
            .map_err(|e| KafkaIntegrationError::OffsetCommitError(e.to_string()))?;

        debug!(messages = batch.len(), "Committed offsets");
        Ok(())
    }
}

fn detach(message: &BorrowedMessage<'_>) -> StreamMessage {
    StreamMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        payload: message.payload().map(<[u8]>::to_vec),
        timestamp: message.timestamp().to_millis(),
    }
}
