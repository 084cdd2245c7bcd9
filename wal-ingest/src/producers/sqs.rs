//! SQS driver (spec §4.4 "SQS driver contract"): enqueue to
//! `queueUrl = prefix + topicName`; honor `DelaySeconds` from
//! `lifecycle.delay` up to the backend maximum of 900s.
//!
//! No SQS code exists anywhere in the pack to imitate directly; the
//! `aws-sdk-sqs`/`aws-config` builder idiom below follows the uniform
//! shape those crates use across every `aws-sdk-*` client (attested in
//! `other_examples/manifests/flowcatalyst-flowcatalyst/Cargo.toml`), and
//! the trait impl mirrors the other two drivers in this module for
//! consistency with the `Producer` contract.

use async_trait::async_trait;
use aws_sdk_sqs::Client as SqsClient;
use chrono::Utc;
use wal_common::model::ProducerResult;

use crate::producer::{DriverMessage, HealthState, Producer, ProducerError, ProducerHealthEntry};

const SQS_MAX_DELAY_SECONDS: i32 = 900;

pub struct SqsProducer {
    client: SqsClient,
    queue_url_prefix: String,
}

impl SqsProducer {
    pub async fn new(queue_url_prefix: &str) -> Self {
        let config = aws_config::load_from_env().await;
        let client = SqsClient::new(&config);
        Self {
            client,
            queue_url_prefix: queue_url_prefix.to_owned(),
        }
    }

    pub fn with_client(client: SqsClient, queue_url_prefix: &str) -> Self {
        Self {
            client,
            queue_url_prefix: queue_url_prefix.to_owned(),
        }
    }

    fn queue_url(&self, topic: &str) -> String {
        format!("{}{}", self.queue_url_prefix, topic)
    }
}

#[async_trait]
impl Producer for SqsProducer {
    fn backend_name(&self) -> &'static str {
        "sqs"
    }

    async fn send(&self, message: DriverMessage) -> Result<ProducerResult, ProducerError> {
        let queue_url = self.queue_url(&message.topic);
        let body = String::from_utf8_lossy(&message.value).into_owned();
        let delay_seconds =
            ((message.delay_ms / 1000) as i32).min(SQS_MAX_DELAY_SECONDS);

        let mut request = self
            .client
            .send_message()
            .queue_url(&queue_url)
            .message_body(body);
        if delay_seconds > 0 {
            request = request.delay_seconds(delay_seconds);
        }
        for (name, value) in &message.headers {
            if let Ok(attr) = aws_sdk_sqs::types::MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value)
                .build()
            {
                request = request.message_attributes(name, attr);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProducerError::Unavailable(format!("sqs SendMessage failed: {e}")))?;

        Ok(ProducerResult {
            message_id: response.message_id().map(str::to_owned),
            success: true,
            partition: None,
            offset: None,
            timestamp: Utc::now(),
            durable: true,
            scheduled: delay_seconds > 0,
            metadata: None,
        })
    }

    async fn health_check(&self) -> bool {
        // SQS has no dedicated ping; a lightweight attribute fetch on the
        // default topic-independent queue-url-prefix is not meaningful,
        // so treat client construction success as the health signal and
        // rely on `send` failures to report transient unavailability.
        true
    }

    async fn health_status(&self) -> ProducerHealthEntry {
        ProducerHealthEntry {
            backend: "sqs",
            state: HealthState::Healthy,
            detail: None,
        }
    }
}
