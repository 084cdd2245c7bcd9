//! Producer Factory (C5): one producer instance per backend per process,
//! constructed lazily and health-sampled on a schedule.
//!
//! Grounded on `hook_janitor::kafka_producer::create_kafka_producer` for
//! the lazy-construction-behind-a-closure shape, and on
//! `common::health::HealthRegistry`'s periodic-reporting background task
//! for the health-sampling loop. The "constructor-wired service graph
//! built once at startup" pattern this replaces framework DI with is the
//! explicit design choice in spec §9.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{info, warn};
use wal_common::model::Backend;

use crate::producer::{HealthState, Producer, ProducerError, ProducerHealthEntry};

const MAX_CONSTRUCT_ATTEMPTS: u32 = 3;
const CONSTRUCT_BACKOFF_BASE: Duration = Duration::from_secs(1);
const HEALTH_SAMPLE_INTERVAL: Duration = Duration::from_secs(30);

/// Builds a concrete `Producer` for a backend kind. Production code wires
/// `RedisProducer`/`KafkaProducer`/`SqsProducer` behind this; tests wire
/// pre-seeded `MockProducer`s instead — the same seam
/// `hook_worker`/`hook_janitor` use for swapping a real Postgres pool for
/// a test one.
#[async_trait]
pub trait ProducerBuilder: Send + Sync {
    async fn build(&self, backend: Backend) -> Result<Arc<dyn Producer>, ProducerError>;
}

/// Fallback ordering table (spec §4.5), consulted by C7, not inlined
/// into `get`.
pub fn fallback_order(backend: Backend) -> &'static [Backend] {
    match backend {
        Backend::Redis => &[Backend::Kafka, Backend::Sqs],
        Backend::Kafka => &[Backend::Redis, Backend::Sqs],
        Backend::Sqs => &[Backend::Kafka, Backend::Redis],
    }
}

pub struct ProducerFactory {
    builder: Arc<dyn ProducerBuilder>,
    producers: DashMap<&'static str, Arc<dyn Producer>>,
    health: DashMap<&'static str, ProducerHealthEntry>,
    construct_lock: Mutex<()>,
}

fn backend_key(backend: Backend) -> &'static str {
    backend.as_str()
}

impl ProducerFactory {
    pub fn new(builder: Arc<dyn ProducerBuilder>) -> Self {
        Self {
            builder,
            producers: DashMap::new(),
            health: DashMap::new(),
            construct_lock: Mutex::new(()),
        }
    }

    /// Return the cached producer for `backend`, constructing it with up
    /// to 3 attempts and exponential backoff on first use (spec §4.5).
    /// Concurrent callers for the same backend are serialized through
    /// `construct_lock` so construction happens at most once
    /// (spec §5 "single-flight").
    pub async fn get(&self, backend: Backend) -> Result<Arc<dyn Producer>, ProducerError> {
        if let Some(producer) = self.producers.get(backend_key(backend)) {
            return Ok(producer.clone());
        }

        let _guard = self.construct_lock.lock().await;
        if let Some(producer) = self.producers.get(backend_key(backend)) {
            return Ok(producer.clone());
        }

        let mut attempt = 0u32;
        loop {
            match self.builder.build(backend).await {
                Ok(producer) => {
                    self.producers.insert(backend_key(backend), producer.clone());
                    self.health.insert(
                        backend_key(backend),
                        ProducerHealthEntry {
                            backend: backend_key(backend),
                            state: HealthState::Healthy,
                            detail: None,
                        },
                    );
                    return Ok(producer);
                }
                Err(e) if attempt + 1 < MAX_CONSTRUCT_ATTEMPTS => {
                    attempt += 1;
                    warn!("producer construction for {backend:?} attempt {attempt} failed: {e}");
                    tokio::time::sleep(CONSTRUCT_BACKOFF_BASE * attempt).await;
                }
                Err(e) => {
                    return Err(ProducerError::Unavailable(format!(
                        "producer for {backend:?} unavailable after {MAX_CONSTRUCT_ATTEMPTS} attempts: {e}"
                    )));
                }
            }
        }
    }

    pub fn cached_health(&self, backend: Backend) -> Option<ProducerHealthEntry> {
        self.health.get(backend_key(backend)).map(|e| e.clone())
    }

    /// Background loop: every 30s, sample `health_status` on every
    /// instantiated producer and refresh the cache, logging transitions
    /// into `unhealthy` (spec §4.5). Reports into `liveness` on every
    /// tick so the process-wide `/_liveness` probe reflects that this
    /// loop is still running, the same way `hook-worker`'s poll loop
    /// calls `worker_liveness.report_healthy()`.
    pub async fn run_health_sampler(self: Arc<Self>, liveness: Option<health::HealthHandle>) {
        let mut interval = tokio::time::interval(HEALTH_SAMPLE_INTERVAL);
        loop {
            interval.tick().await;
            self.sample_health_once().await;
            if let Some(handle) = &liveness {
                handle.report_healthy().await;
            }
        }
    }

    async fn sample_health_once(&self) {
        let backends: Vec<&'static str> =
            self.producers.iter().map(|e| *e.key()).collect();
        for key in backends {
            let Some(producer) = self.producers.get(key).map(|p| p.clone()) else {
                continue;
            };
            let previous_state = self.health.get(key).map(|e| e.state);
            let entry = producer.health_status().await;
            if previous_state != Some(entry.state) {
                match entry.state {
                    HealthState::Degraded => {
                        warn!("producer {key} transitioned to degraded: {:?}", entry.detail)
                    }
                    HealthState::Unhealthy => {
                        warn!("producer {key} transitioned to unhealthy: {:?}", entry.detail)
                    }
                    HealthState::Healthy => {
                        if previous_state.is_some() {
                            info!("producer {key} recovered to healthy");
                        }
                    }
                }
            }
            self.health.insert(key, entry);
        }
    }

    /// Graceful shutdown: disconnect every instantiated producer and
    /// clear the caches (spec §4.5).
    pub async fn shutdown(&self) {
        for entry in self.producers.iter() {
            entry.value().disconnect().await;
        }
        self.producers.clear();
        self.health.clear();
        info!("producer factory shut down");
    }
}

/// Map-of-closures builder used by the binary to wire real drivers from
/// configuration without `ProducerFactory` itself knowing about
/// connection strings.
pub struct ConfiguredProducerBuilder {
    constructors: HashMap<
        &'static str,
        Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn Producer>, ProducerError>> + Send + Sync>,
    >,
}

impl ConfiguredProducerBuilder {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn with_backend<F, Fut>(mut self, backend: Backend, constructor: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Arc<dyn Producer>, ProducerError>> + Send + 'static,
    {
        self.constructors
            .insert(backend_key(backend), Box::new(move || Box::pin(constructor())));
        self
    }
}

impl Default for ConfiguredProducerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProducerBuilder for ConfiguredProducerBuilder {
    async fn build(&self, backend: Backend) -> Result<Arc<dyn Producer>, ProducerError> {
        match self.constructors.get(backend_key(backend)) {
            Some(constructor) => constructor().await,
            None => Err(ProducerError::Unavailable(format!(
                "no producer constructor configured for {backend:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producers::MockProducer;

    struct MapBuilder {
        map: HashMap<&'static str, Arc<dyn Producer>>,
    }

    #[async_trait]
    impl ProducerBuilder for MapBuilder {
        async fn build(&self, backend: Backend) -> Result<Arc<dyn Producer>, ProducerError> {
            self.map
                .get(backend_key(backend))
                .cloned()
                .ok_or_else(|| ProducerError::Unavailable("not configured".to_owned()))
        }
    }

    #[test]
    fn fallback_order_matches_table() {
        assert_eq!(fallback_order(Backend::Redis), &[Backend::Kafka, Backend::Sqs]);
        assert_eq!(fallback_order(Backend::Kafka), &[Backend::Redis, Backend::Sqs]);
        assert_eq!(fallback_order(Backend::Sqs), &[Backend::Kafka, Backend::Redis]);
    }

    #[tokio::test]
    async fn get_caches_constructed_producer() {
        let mut map: HashMap<&'static str, Arc<dyn Producer>> = HashMap::new();
        map.insert("redis", Arc::new(MockProducer::new("redis")));
        let factory = ProducerFactory::new(Arc::new(MapBuilder { map }));

        let first = factory.get(Backend::Redis).await.unwrap();
        let second = factory.get(Backend::Redis).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn get_surfaces_unavailable_when_unconfigured() {
        let factory = ProducerFactory::new(Arc::new(MapBuilder {
            map: HashMap::new(),
        }));
        let err = factory.get(Backend::Sqs).await.unwrap_err();
        assert!(matches!(err, ProducerError::Unavailable(_)));
    }

    #[tokio::test]
    async fn shutdown_clears_caches() {
        let mut map: HashMap<&'static str, Arc<dyn Producer>> = HashMap::new();
        map.insert("kafka", Arc::new(MockProducer::new("kafka")));
        let factory = ProducerFactory::new(Arc::new(MapBuilder { map }));

        factory.get(Backend::Kafka).await.unwrap();
        factory.shutdown().await;
        assert!(factory.cached_health(Backend::Kafka).is_none());
    }
}
