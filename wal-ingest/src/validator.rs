//! Validator/Enricher (C3): namespace resolution, API-key format check,
//! schema validation, and enrichment into an `EnrichedMessage` (spec
//! §4.3). Each step produces its own error kind; no step is skipped.
//!
//! Grounded on `hook_common::webhook`'s job-parameter construction shape
//! for the enrichment step, and on `capture::api`'s per-field validation
//! style (return the first failing `CaptureError` variant) for the
//! ordered-steps shape.

use wal_common::error::WalError;
use wal_common::identity;
use wal_common::model::{self, EnrichedMessage, MessageStatus, Namespace, WriteIntent};
use wal_registry::NamespaceRegistry;

pub struct ValidatedIntent {
    pub enriched: EnrichedMessage,
    pub policy: Namespace,
}

/// Runs the four C3 steps in order against `registry`, returning the
/// resolved policy alongside the enriched message. `global_max_message_size`
/// and `global_max_delay_seconds` are the platform-wide ceilings
/// (`WAL_MAX_MESSAGE_SIZE`/`WAL_MAX_DELAY_SECONDS`, SPEC_FULL.md §10.3)
/// enforced here ahead of, and independent from, the namespace's own
/// narrower `maxMessageSize`/`maxDelaySeconds` policy (checked later by
/// `NamespaceRegistry::validate`).
pub async fn validate_and_enrich(
    registry: &NamespaceRegistry,
    intent: &WriteIntent,
    api_key: &str,
    trace_id: Option<&str>,
    global_max_message_size: usize,
    global_max_delay_seconds: u64,
) -> Result<ValidatedIntent, WalError> {
    // 1. Resolve namespace.
    let namespace_key = intent.namespace.to_lowercase();
    let policy = registry.get(&namespace_key).await?;

    // 2. API-key format check.
    if !identity::is_valid_api_key_format(api_key) {
        return Err(WalError::new(
            wal_common::error::ErrorKind::Unauthorized,
            "API key is missing or does not match the required format".to_owned(),
        ));
    }

    // 3. Schema validation.
    validate_schema(
        &policy,
        intent,
        global_max_message_size,
        global_max_delay_seconds,
    )?;

    // 4. Enrichment.
    let correlation_id = trace_id
        .map(str::to_owned)
        .unwrap_or_else(identity::generate_correlation_id);

    let enriched = EnrichedMessage {
        message_id: identity::generate_message_id(),
        correlation_id,
        trace_id: trace_id.map(str::to_owned),
        request_id: identity::generate_request_id(),
        namespace: namespace_key,
        payload: intent.payload.clone(),
        target: intent.target.clone(),
        lifecycle: intent.lifecycle.clone(),
        metadata: intent.metadata.clone(),
        priority: intent.priority,
        tags: intent.tags.clone(),
        api_key: api_key.to_owned(),
        timestamp: chrono::Utc::now(),
        version: "1.0".to_owned(),
        attempt_count: 0,
        status: MessageStatus::Pending,
    };

    Ok(ValidatedIntent { enriched, policy })
}

fn validate_schema(
    policy: &Namespace,
    intent: &WriteIntent,
    global_max_message_size: usize,
    global_max_delay_seconds: u64,
) -> Result<(), WalError> {
    let size = model::canonical_json_len(&intent.payload);
    if size > global_max_message_size {
        return Err(WalError::validation(format!(
            "payload is {size} bytes, exceeds the platform-wide {global_max_message_size}-byte cap"
        )));
    }

    if let Some(delay) = intent.lifecycle.as_ref().and_then(|l| l.delay) {
        if delay > global_max_delay_seconds {
            return Err(WalError::validation(format!(
                "lifecycle.delay {delay}s exceeds the platform-wide {global_max_delay_seconds}s cap"
            )));
        }
    }

    let Some(rules) = &policy.schema_rules else {
        return Ok(());
    };

    let object = intent
        .payload
        .as_object()
        .ok_or_else(|| WalError::validation("payload must be a JSON object"))?;

    for required in &rules.required {
        if !object.contains_key(required) {
            return Err(WalError::validation(format!(
                "payload is missing required field '{required}'"
            )));
        }
    }

    for (field, rule) in &rules.properties {
        let Some(expected_type) = &rule.property_type else {
            continue;
        };
        if let Some(value) = object.get(field) {
            let observed = json_type_name(value);
            if observed != expected_type {
                return Err(WalError::validation(format!(
                    "field '{field}' has type '{observed}', expected '{expected_type}'"
                )));
            }
        }
    }

    Ok(())
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Null => "null",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use wal_common::model::{
        Backend, BackoffStrategy, PropertyRule, RetryPolicy, SchemaRules, ShardConfig, TargetConfig,
        TargetType, Targets,
    };
    use wal_registry::InMemoryNamespaceStore;

    fn namespace(name: &str, schema_rules: Option<SchemaRules>) -> Namespace {
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
            max_message_size: 10_000,
            max_delay_seconds: 86_400,
            schema_rules,
        }
    }

    fn intent(payload: serde_json::Value) -> WriteIntent {
        WriteIntent {
            namespace: "NS".to_owned(),
            payload,
            target: Targets::One(TargetConfig {
                target_type: TargetType::Cache,
                identifier: None,
                config: serde_json::json!({}),
            }),
            lifecycle: None,
            metadata: None,
            priority: None,
            tags: None,
        }
    }

    fn registry_with(ns: Namespace) -> NamespaceRegistry {
        NamespaceRegistry::new(Arc::new(InMemoryNamespaceStore::new().with(ns)))
    }

    const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;
    const DEFAULT_MAX_DELAY_SECONDS: u64 = 86_400;

    #[tokio::test]
    async fn lowercases_namespace_and_enriches() {
        let registry = registry_with(namespace("ns", None));
        let result = validate_and_enrich(
            &registry,
            &intent(serde_json::json!({"k": "v"})),
            &"a".repeat(16),
            None,
            DEFAULT_MAX_MESSAGE_SIZE,
            DEFAULT_MAX_DELAY_SECONDS,
        )
        .await
        .unwrap();

        assert_eq!(result.enriched.namespace, "ns");
        assert!(wal_common::identity::is_valid_message_id(
            &result.enriched.message_id
        ));
        assert!(!result.enriched.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn rejects_malformed_api_key() {
        let registry = registry_with(namespace("ns", None));
        let err = validate_and_enrich(
            &registry,
            &intent(serde_json::json!({})),
            "short",
            None,
            DEFAULT_MAX_MESSAGE_SIZE,
            DEFAULT_MAX_DELAY_SECONDS,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, wal_common::error::ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn enforces_required_schema_fields() {
        let rules = SchemaRules {
            required: vec!["user_id".to_owned()],
            properties: HashMap::new(),
        };
        let registry = registry_with(namespace("ns", Some(rules)));
        let err = validate_and_enrich(
            &registry,
            &intent(serde_json::json!({"other": 1})),
            &"a".repeat(16),
            None,
            DEFAULT_MAX_MESSAGE_SIZE,
            DEFAULT_MAX_DELAY_SECONDS,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, wal_common::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn enforces_property_type() {
        let mut properties = HashMap::new();
        properties.insert(
            "count".to_owned(),
            PropertyRule {
                property_type: Some("number".to_owned()),
            },
        );
        let rules = SchemaRules {
            required: vec![],
            properties,
        };
        let registry = registry_with(namespace("ns", Some(rules)));
        let err = validate_and_enrich(
            &registry,
            &intent(serde_json::json!({"count": "not-a-number"})),
            &"a".repeat(16),
            None,
            DEFAULT_MAX_MESSAGE_SIZE,
            DEFAULT_MAX_DELAY_SECONDS,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, wal_common::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn correlation_id_reuses_trace_id_when_present() {
        let registry = registry_with(namespace("ns", None));
        let result = validate_and_enrich(
            &registry,
            &intent(serde_json::json!({})),
            &"a".repeat(16),
            Some("trace-abc"),
            DEFAULT_MAX_MESSAGE_SIZE,
            DEFAULT_MAX_DELAY_SECONDS,
        )
        .await
        .unwrap();
        assert_eq!(result.enriched.correlation_id, "trace-abc");
        assert_eq!(result.enriched.trace_id.as_deref(), Some("trace-abc"));
    }

    #[tokio::test]
    async fn platform_wide_cap_rejects_even_under_a_lenient_namespace_policy() {
        let mut ns = namespace("ns", None);
        ns.max_message_size = 10_000_000;
        let registry = registry_with(ns);

        let err = validate_and_enrich(
            &registry,
            &intent(serde_json::json!({"k": "x".repeat(200)})),
            &"a".repeat(16),
            None,
            100,
            DEFAULT_MAX_DELAY_SECONDS,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, wal_common::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn platform_wide_delay_cap_is_enforced() {
        let registry = registry_with(namespace("ns", None));
        let mut write_intent = intent(serde_json::json!({}));
        write_intent.lifecycle = Some(wal_common::model::Lifecycle {
            delay: Some(100),
            retry_policy: None,
        });

        let err = validate_and_enrich(
            &registry,
            &write_intent,
            &"a".repeat(16),
            None,
            DEFAULT_MAX_MESSAGE_SIZE,
            60,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, wal_common::error::ErrorKind::Validation);
    }
}
