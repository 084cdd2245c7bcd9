//! The producer contract (spec §4.4) every backend driver implements.
//!
//! Shaped after `capture::sinks::Event` (an async trait object dispatched
//! on by backend, with a `send`/`send_batch` split) and
//! `feature_flags::redis::Client` (narrow async trait, a mock behind the
//! same trait for tests).

use async_trait::async_trait;
use thiserror::Error;
use wal_common::model::ProducerResult;

#[derive(Error, Debug, Clone)]
pub enum ProducerError {
    #[error("downstream system refused the write: {0}")]
    TargetRefused(String),
    #[error("producer unavailable: {0}")]
    Unavailable(String),
    #[error("producer operation timed out: {0}")]
    Timeout(String),
}

/// A fully-formed driver payload, assembled by the ingestion pipeline
/// (spec §4.7 step 6) from an `EnrichedMessage` plus routing metadata.
#[derive(Debug, Clone)]
pub struct DriverMessage {
    pub topic: String,
    pub value: Vec<u8>,
    pub partition: u32,
    pub headers: Vec<(String, String)>,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    /// Reachable but impaired, e.g. a Redis connection that keeps
    /// dropping and reconnecting (spec §3/§4.4: `status ∈ {healthy,
    /// degraded, unhealthy}`).
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct ProducerHealthEntry {
    pub backend: &'static str,
    pub state: HealthState,
    pub detail: Option<String>,
}

#[async_trait]
pub trait Producer: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn send(&self, message: DriverMessage) -> Result<ProducerResult, ProducerError>;

    async fn health_check(&self) -> bool;

    async fn health_status(&self) -> ProducerHealthEntry;

    /// Best-effort compensation hook invoked by C6 on rollback. Default
    /// no-op: most drivers have nothing to undo once `send` has been
    /// attempted (spec §4.6 "driver-specific compensation hook
    /// (best-effort)").
    async fn compensate(&self, _message_id: &str) {}

    async fn disconnect(&self) {}
}
