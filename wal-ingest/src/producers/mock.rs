//! An in-memory `Producer` test double, the clean "test double interface"
//! the spec requires in place of the source's mock-producer scaffold
//! (spec §9 "Mock producers in the source are a Phase-1 scaffold ...
//! Implementations must provide ... a clean test double interface").
//!
//! Modeled directly on `feature_flags::redis::MockRedisClient`: a
//! builder-configurable struct behind the same trait as the real thing,
//! plus an observable call log so tests can assert "no producer call
//! issued" (spec §8 scenario 3).

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use wal_common::model::ProducerResult;

use crate::producer::{DriverMessage, HealthState, Producer, ProducerError, ProducerHealthEntry};

pub struct MockProducer {
    backend: &'static str,
    healthy: Mutex<bool>,
    next_result: Mutex<Option<Result<ProducerResult, ProducerError>>>,
    sent: Mutex<Vec<DriverMessage>>,
    compensated: Mutex<Vec<String>>,
}

impl MockProducer {
    pub fn new(backend: &'static str) -> Self {
        Self {
            backend,
            healthy: Mutex::new(true),
            next_result: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            compensated: Mutex::new(Vec::new()),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.lock().unwrap() = healthy;
    }

    pub fn queue_result(&self, result: Result<ProducerResult, ProducerError>) {
        *self.next_result.lock().unwrap() = Some(result);
    }

    pub fn sent_messages(&self) -> Vec<DriverMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn compensated_ids(&self) -> Vec<String> {
        self.compensated.lock().unwrap().clone()
    }

    fn default_result(&self) -> ProducerResult {
        ProducerResult {
            message_id: Some("mock-entry-id".to_owned()),
            success: true,
            partition: Some(0),
            offset: Some(0),
            timestamp: Utc::now(),
            durable: true,
            scheduled: false,
            metadata: None,
        }
    }
}

#[async_trait]
impl Producer for MockProducer {
    fn backend_name(&self) -> &'static str {
        self.backend
    }

    async fn send(&self, message: DriverMessage) -> Result<ProducerResult, ProducerError> {
        self.sent.lock().unwrap().push(message);
        match self.next_result.lock().unwrap().take() {
            Some(result) => result,
            None => Ok(self.default_result()),
        }
    }

    async fn health_check(&self) -> bool {
        *self.healthy.lock().unwrap()
    }

    async fn health_status(&self) -> ProducerHealthEntry {
        let healthy = *self.healthy.lock().unwrap();
        ProducerHealthEntry {
            backend: self.backend,
            state: if healthy {
                HealthState::Healthy
            } else {
                HealthState::Unhealthy
            },
            detail: None,
        }
    }

    async fn compensate(&self, message_id: &str) {
        self.compensated.lock().unwrap().push(message_id.to_owned());
    }
}
