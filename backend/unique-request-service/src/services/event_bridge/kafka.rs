use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::{EventPublisher, OutboundRecord, RecordSource};
use crate::error::{AppError, Result};
use crate::metrics;

/// Kafka producer for identifiers and reports
///
/// `publish` only enqueues into librdkafka's buffer. The delivery report is
/// awaited on a detached task so ingress never waits for the broker.
#[derive(Clone)]
pub struct KafkaEventPublisher {
    producer: FutureProducer,
}

impl KafkaEventPublisher {
    pub fn new(brokers: &str) -> Result<Self> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("queue.buffering.max.messages", "100000")
            .set("linger.ms", "5")
            .set("acks", "all")
            .set("compression.type", "lz4")
            .create::<FutureProducer>()
            .map_err(|e| {
                error!("Failed to create Kafka producer: {}", e);
                AppError::Kafka(e)
            })?;

        info!(brokers = %brokers, "Kafka producer created");

        Ok(Self { producer })
    }
}

impl EventPublisher for KafkaEventPublisher {
    fn publish(&self, record: &OutboundRecord) -> Result<()> {
        let mut future_record =
            FutureRecord::<str, str>::to(&record.topic).payload(record.payload.as_str());
        if let Some(key) = record.key.as_deref() {
            future_record = future_record.key(key);
        }

        let delivery = self
            .producer
            .send_result(future_record)
            .map_err(|(e, _)| AppError::Kafka(e))?;

        let topic = record.topic.clone();
        tokio::spawn(async move {
            match delivery.await {
                Ok(Ok(_)) => debug!(topic = %topic, "Record delivered"),
                Ok(Err((e, _))) => {
                    metrics::PUBLISH_FAILURES.with_label_values(&["delivery"]).inc();
                    warn!(topic = %topic, error = %e, "Record delivery failed");
                }
                Err(_) => {
                    metrics::PUBLISH_FAILURES.with_label_values(&["delivery"]).inc();
                    warn!(topic = %topic, "Delivery report dropped before completion");
                }
            }
        });

        Ok(())
    }
}

/// Kafka consumer feeding the membership merge loop
pub struct KafkaRecordSource {
    consumer: StreamConsumer,
    poll_timeout: Duration,
}

impl KafkaRecordSource {
    /// # Arguments
    /// * `brokers` - Kafka brokers (comma-separated)
    /// * `group_id` - Consumer group; must be unique per instance for convergence
    /// * `topic` - Identifier topic
    /// * `offset_reset` - `earliest` replays the topic on first start, `latest` does not
    /// * `poll_timeout` - Upper bound on a single poll
    pub fn new(
        brokers: &str,
        group_id: &str,
        topic: &str,
        offset_reset: &str,
        poll_timeout: Duration,
    ) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", group_id)
            .set("bootstrap.servers", brokers)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "5000")
            .set("auto.offset.reset", offset_reset)
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "3000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| {
                error!("Failed to create Kafka consumer: {}", e);
                AppError::Kafka(e)
            })?;

        consumer.subscribe(&[topic]).map_err(|e| {
            error!("Failed to subscribe to topic: {}", e);
            AppError::Kafka(e)
        })?;

        info!(
            topic = %topic,
            group_id = %group_id,
            "Kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            poll_timeout,
        })
    }
}

#[async_trait]
impl RecordSource for KafkaRecordSource {
    async fn poll(&self) -> Result<Option<Vec<u8>>> {
        match timeout(self.poll_timeout, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Ok(msg)) => {
                debug!(
                    topic = msg.topic(),
                    partition = msg.partition(),
                    offset = msg.offset(),
                    "Received record"
                );
                // A record without a payload classifies as unrecognized.
                Ok(Some(msg.payload().map(<[u8]>::to_vec).unwrap_or_default()))
            }
            Ok(Err(e)) => Err(AppError::Kafka(e)),
        }
    }
}
