//! The cached registry in front of a `NamespaceStore` (component C2).
//!
//! Concurrent reads, serialized writes, stale entries tolerated up to
//! TTL (spec §5 "Shared resources"). Grounded on the single-flight /
//! read-mostly-cache shape the spec calls for; implemented with
//! `dashmap` the way `examples/PostHog-posthog/rust/kafka-assigner`
//! uses it for its own concurrent maps.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use wal_common::error::{ErrorKind, WalError};
use wal_common::model::{Namespace, WriteIntent};

use crate::store::NamespaceStore;

struct CacheEntry {
    namespace: Namespace,
    expires_at: Instant,
}

pub struct NamespaceRegistry {
    store: Arc<dyn NamespaceStore>,
    cache: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl NamespaceRegistry {
    pub fn new(store: Arc<dyn NamespaceStore>) -> Self {
        Self::with_ttl(store, Duration::from_secs(60))
    }

    pub fn with_ttl(store: Arc<dyn NamespaceStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            ttl,
        }
    }

    /// `get(name) -> Namespace | NotFound` (spec §4.2).
    pub async fn get(&self, name: &str) -> Result<Namespace, WalError> {
        if let Some(entry) = self.cache.get(name) {
            if entry.expires_at > Instant::now() {
                return Ok(entry.namespace.clone());
            }
        }

        let fetched = self
            .store
            .fetch(name)
            .await
            .map_err(|e| WalError::new(ErrorKind::DatabaseError, e.to_string()))?
            .ok_or_else(|| WalError::namespace_not_found(name))?;

        self.cache.insert(
            name.to_owned(),
            CacheEntry {
                namespace: fetched.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );

        Ok(fetched)
    }

    /// Invalidate a cached entry, e.g. after an out-of-band policy
    /// update is signalled by the (out-of-scope) admin collaborator.
    pub fn invalidate(&self, name: &str) {
        self.cache.remove(name);
    }

    /// `validate(name, intent) -> void | Violation` (spec §4.2), run in
    /// the exact order the spec specifies: existence (already checked by
    /// `get`) → enabled → message size → delay bound → target type.
    pub fn validate(&self, namespace: &Namespace, intent: &WriteIntent) -> Result<(), WalError> {
        if !namespace.enabled {
            return Err(WalError::new(
                ErrorKind::InvalidNamespace,
                format!("namespace '{}' is disabled", namespace.name),
            ));
        }

        let size = wal_common::model::canonical_json_len(&intent.payload);
        if size > namespace.max_message_size {
            return Err(WalError::validation(format!(
                "payload is {size} bytes, exceeds namespace limit of {} bytes",
                namespace.max_message_size
            )));
        }

        if let Some(lifecycle) = &intent.lifecycle {
            if let Some(delay) = lifecycle.delay {
                if delay > namespace.max_delay_seconds {
                    return Err(WalError::validation(format!(
                        "lifecycle.delay {delay}s exceeds namespace limit of {}s",
                        namespace.max_delay_seconds
                    )));
                }
            }
        }

        if let Some(target_config) = &namespace.target_config {
            for target in intent.target.iter() {
                if target.target_type != target_config.target_type {
                    return Err(WalError::validation(format!(
                        "target type {:?} does not match namespace target type {:?}",
                        target.target_type, target_config.target_type
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryNamespaceStore;
    use wal_common::model::{
        Backend, BackoffStrategy, Lifecycle, RetryPolicy, ShardConfig, Targets,
    };

    fn sample_namespace(name: &str) -> Namespace {
        Namespace {
            name: name.to_owned(),
            enabled: true,
            backend: Backend::Redis,
            topic_name: name.to_owned(),
            retry_policy: RetryPolicy {
                max_attempts: 3,
                backoff_strategy: BackoffStrategy::Exponential,
                backoff_multiplier: 2.0,
                max_delay_ms: 30_000,
            },
            shard_config: ShardConfig::default(),
            target_config: None,
            rate_limit_config: None,
            max_message_size: 100,
            max_delay_seconds: 86_400,
            schema_rules: None,
        }
    }

    fn sample_intent(namespace: &str, payload: serde_json::Value) -> WriteIntent {
        WriteIntent {
            namespace: namespace.to_owned(),
            payload,
            target: Targets::One(wal_common::model::TargetConfig {
                target_type: wal_common::model::TargetType::Cache,
                identifier: None,
                config: serde_json::json!({}),
            }),
            lifecycle: None,
            metadata: None,
            priority: None,
            tags: None,
        }
    }

    #[tokio::test]
    async fn get_returns_not_found_for_unknown_namespace() {
        let store = Arc::new(InMemoryNamespaceStore::new());
        let registry = NamespaceRegistry::new(store);

        let err = registry.get("does-not-exist").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NamespaceNotFound);
    }

    #[tokio::test]
    async fn get_caches_and_serves_from_cache() {
        let store = Arc::new(InMemoryNamespaceStore::new().with(sample_namespace("ns")));
        let registry = NamespaceRegistry::new(store);

        let first = registry.get("ns").await.unwrap();
        let second = registry.get("ns").await.unwrap();
        assert_eq!(first.name, second.name);
    }

    #[test]
    fn validate_rejects_disabled_namespace() {
        let mut ns = sample_namespace("ns");
        ns.enabled = false;
        let store = Arc::new(InMemoryNamespaceStore::new());
        let registry = NamespaceRegistry::new(store);

        let intent = sample_intent("ns", serde_json::json!({"k": "v"}));
        let err = registry.validate(&ns, &intent).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidNamespace);
    }

    #[test]
    fn validate_enforces_message_size_boundary() {
        let ns = sample_namespace("ns"); // max_message_size = 100
        let store = Arc::new(InMemoryNamespaceStore::new());
        let registry = NamespaceRegistry::new(store);

        // exactly at the boundary: {"k":"<88 chars>"} should total close to 100 bytes.
        let filler = "x".repeat(85);
        let exact_payload = serde_json::json!({ "k": filler });
        let size = wal_common::model::canonical_json_len(&exact_payload);
        assert!(size <= 100, "test payload must fit under the limit, was {size}");
        let intent = sample_intent("ns", exact_payload);
        assert!(registry.validate(&ns, &intent).is_ok());

        let too_big = serde_json::json!({ "k": "x".repeat(500) });
        let intent = sample_intent("ns", too_big);
        let err = registry.validate(&ns, &intent).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn validate_enforces_delay_boundary() {
        let mut ns = sample_namespace("ns");
        ns.max_message_size = 10_000;
        ns.max_delay_seconds = 5;
        let store = Arc::new(InMemoryNamespaceStore::new());
        let registry = NamespaceRegistry::new(store);

        let mut intent = sample_intent("ns", serde_json::json!({"k": "v"}));
        intent.lifecycle = Some(Lifecycle {
            delay: Some(5),
            retry_policy: None,
        });
        assert!(registry.validate(&ns, &intent).is_ok());

        intent.lifecycle = Some(Lifecycle {
            delay: Some(6),
            retry_policy: None,
        });
        let err = registry.validate(&ns, &intent).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn validate_enforces_target_type_match() {
        let mut ns = sample_namespace("ns");
        ns.max_message_size = 10_000;
        ns.target_config = Some(wal_common::model::TargetConfig {
            target_type: wal_common::model::TargetType::Http,
            identifier: None,
            config: serde_json::json!({}),
        });
        let store = Arc::new(InMemoryNamespaceStore::new());
        let registry = NamespaceRegistry::new(store);

        // sample_intent's target is Cache, namespace expects Http.
        let intent = sample_intent("ns", serde_json::json!({"k": "v"}));
        let err = registry.validate(&ns, &intent).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
