//! Kafka consumer-group session.

use super::consumer::{ConsumerSession, InboundMessage};
use crate::config::KafkaConfig;
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{error, info};

pub struct KafkaSession {
    consumer: StreamConsumer,
}

impl KafkaSession {
    /// Joins `config.group_id` and subscribes to `topics`.
    pub fn connect(config: &KafkaConfig, topics: &[String]) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .create()
            .map_err(|err| OrderError::Broker(format!("failed to create consumer: {err}")))?;

        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(|err| OrderError::Broker(format!("failed to subscribe: {err}")))?;

        info!(brokers = %config.brokers, group_id = %config.group_id, ?topics, "subscribed to kafka topics");
        Ok(Self { consumer })
    }
}

#[async_trait]
impl ConsumerSession for KafkaSession {
    async fn next_message(&mut self) -> Result<Option<InboundMessage>> {
        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    let headers = message
                        .headers()
                        .map(|headers| {
                            headers
                                .iter()
                                .map(|header| {
                                    (header.key.to_string(), header.value.unwrap_or_default().to_vec())
                                })
                                .collect()
                        })
                        .unwrap_or_default();

                    return Ok(Some(InboundMessage {
                        topic: message.topic().to_string(),
                        partition: message.partition(),
                        offset: message.offset(),
                        key: message.key().map(<[u8]>::to_vec),
                        headers,
                        payload: message.payload().unwrap_or_default().to_vec(),
                    }));
                }
                Err(err) => error!(error = %err, "kafka consumer error"),
            }
        }
    }

    async fn mark(&mut self, message: &InboundMessage) -> Result<()> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|err| OrderError::Broker(err.to_string()))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|err| OrderError::Broker(err.to_string()))
    }
}
