//! Kafka driver (spec §4.4 "Kafka driver contract"): append to
//! `topicName`, partition pre-selected by C1; the result carries
//! `partition, offset`.
//!
//! Grounded on `capture::sinks::kafka::KafkaSink` for construction,
//! context wiring, and ack handling, and
//! `hook_janitor::kafka_producer::create_kafka_producer` for the plain
//! (non-liveness-reporting) client-config boilerplate.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use tracing::{debug, info, warn};
use wal_common::model::ProducerResult;

use crate::producer::{DriverMessage, HealthState, Producer, ProducerError, ProducerHealthEntry};

struct KafkaContext;

impl rdkafka::ClientContext for KafkaContext {}

pub struct KafkaProducer {
    producer: FutureProducer<KafkaContext>,
}

impl KafkaProducer {
    pub fn new(bootstrap_servers: &str) -> Result<Self, ProducerError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", bootstrap_servers)
            .set("statistics.interval.ms", "10000")
            .set("message.timeout.ms", "30000");

        debug!("rdkafka configuration: {:?}", client_config);
        let producer: FutureProducer<KafkaContext> = client_config
            .create_with_context(KafkaContext)
            .map_err(|e| ProducerError::Unavailable(format!("failed to build producer: {e}")))?;

        Ok(Self { producer })
    }
}

#[async_trait]
impl Producer for KafkaProducer {
    fn backend_name(&self) -> &'static str {
        "kafka"
    }

    async fn send(&self, message: DriverMessage) -> Result<ProducerResult, ProducerError> {
        let message_id = message
            .headers
            .iter()
            .find(|(k, _)| k == "message-id")
            .map(|(_, v)| v.clone());

        let mut owned_headers = OwnedHeaders::new();
        for (name, value) in &message.headers {
            owned_headers = owned_headers.insert(Header {
                key: name.as_str(),
                value: Some(value.as_str()),
            });
        }

        let mut record = FutureRecord::to(&message.topic)
            .payload(&message.value)
            .partition(message.partition as i32)
            .headers(owned_headers);
        if let Some(id) = message_id.as_deref() {
            record = record.key(id);
        }

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(30)))
            .await
        {
            Ok((partition, offset)) => Ok(ProducerResult {
                message_id,
                success: true,
                partition: Some(partition as u32),
                offset: Some(offset as u64),
                timestamp: Utc::now(),
                durable: true,
                scheduled: false,
                metadata: None,
            }),
            Err((e, _)) => match e.rdkafka_error_code() {
                Some(RDKafkaErrorCode::MessageSizeTooLarge) => Err(ProducerError::TargetRefused(
                    "message exceeds broker max.message.bytes".to_owned(),
                )),
                _ => Err(ProducerError::Unavailable(format!(
                    "failed to produce to kafka: {e}"
                ))),
            },
        }
    }

    async fn health_check(&self) -> bool {
        self.producer
            .client()
            .fetch_metadata(None, Timeout::After(Duration::from_secs(2)))
            .is_ok()
    }

    async fn health_status(&self) -> ProducerHealthEntry {
        let healthy = self.health_check().await;
        ProducerHealthEntry {
            backend: "kafka",
            state: if healthy {
                HealthState::Healthy
            } else {
                HealthState::Unhealthy
            },
            detail: None,
        }
    }

    async fn disconnect(&self) {
        match self.producer.flush(Duration::from_secs(30)) {
            Ok(()) => info!("kafka producer flushed on shutdown"),
            Err(e) => warn!("kafka producer flush failed: {e}"),
        }
    }
}
