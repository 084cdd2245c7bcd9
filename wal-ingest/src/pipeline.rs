//! Ingestion Pipeline (C7): `write_to_log`, the single entry point that
//! wires C1-C6 together for one request (spec §4.7).
//!
//! Grounded on `hook_worker::worker::process_webhook_job`'s shape —
//! dequeue-equivalent, call the network, classify the outcome, report
//! metrics — and on `capture::sinks::kafka::KafkaSink::send`'s
//! `#[instrument(skip_all)]` + ack-then-classify flow.

use std::sync::Arc;
use std::time::Instant;

use wal_common::error::{ErrorKind, WalError};
use wal_common::mask::mask_api_key;
use wal_common::model::{
    Backend, DurabilityStatus, ProcessingMode, ResponseMetadata, WriteIntent, WriteToLogResponse,
};
use wal_registry::NamespaceRegistry;

use crate::factory::{fallback_order, ProducerFactory};
use crate::producer::{DriverMessage, Producer, ProducerError};
use crate::rate_limit::NamespaceRateLimiter;
use crate::shard::ShardSelector;
use crate::transaction::TransactionOrchestrator;
use crate::validator;

/// Operation classification (spec §4.7 step 1), used only to label the
/// request-duration timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Transaction,
    Delayed,
    Replication,
    Immediate,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Transaction => "TRANSACTION",
            Operation::Delayed => "DELAYED",
            Operation::Replication => "REPLICATION",
            Operation::Immediate => "IMMEDIATE",
        }
    }
}

fn classify_operation(intent: &WriteIntent) -> Operation {
    let is_transaction = intent
        .payload
        .get("transactions")
        .and_then(|v| v.as_array())
        .map(|a| a.len() > 1)
        .unwrap_or(false);
    if is_transaction {
        return Operation::Transaction;
    }

    let has_delay = intent
        .lifecycle
        .as_ref()
        .and_then(|l| l.delay)
        .map(|d| d > 0)
        .unwrap_or(false);
    if has_delay {
        return Operation::Delayed;
    }

    let is_replication = intent.target.iter().any(|t| {
        matches!(t.target_type, wal_common::model::TargetType::Cache) && t.region_count() > 1
    });
    if is_replication {
        return Operation::Replication;
    }

    Operation::Immediate
}

/// `PERSISTED` iff `durable==true` or a non-empty `messageId` was
/// returned on a successful send (spec §9 "Dual source of truth for
/// durability" — `durable` is authoritative; see DESIGN.md).
fn durability_status(result: &wal_common::model::ProducerResult) -> DurabilityStatus {
    if result.durable || (result.success && result.message_id.is_some()) {
        DurabilityStatus::Persisted
    } else if result.scheduled {
        DurabilityStatus::Scheduled
    } else if result.success {
        DurabilityStatus::Acknowledged
    } else {
        DurabilityStatus::Failed
    }
}

pub struct IngestionPipeline {
    pub registry: Arc<NamespaceRegistry>,
    pub factory: Arc<ProducerFactory>,
    pub transactions: Arc<TransactionOrchestrator>,
    pub shards: Arc<ShardSelector>,
    limiters: dashmap::DashMap<String, NamespaceRateLimiter>,
    global_max_message_size: usize,
    global_max_delay_seconds: u64,
}

impl IngestionPipeline {
    /// Platform-wide caps default to the same 1 MiB / 86400s values
    /// `Namespace` itself defaults to (spec §3); use [`Self::with_limits`]
    /// to wire `WAL_MAX_MESSAGE_SIZE`/`WAL_MAX_DELAY_SECONDS` instead.
    pub fn new(
        registry: Arc<NamespaceRegistry>,
        factory: Arc<ProducerFactory>,
        transactions: Arc<TransactionOrchestrator>,
        shards: Arc<ShardSelector>,
    ) -> Self {
        Self::with_limits(registry, factory, transactions, shards, 1024 * 1024, 86_400)
    }

    pub fn with_limits(
        registry: Arc<NamespaceRegistry>,
        factory: Arc<ProducerFactory>,
        transactions: Arc<TransactionOrchestrator>,
        shards: Arc<ShardSelector>,
        global_max_message_size: usize,
        global_max_delay_seconds: u64,
    ) -> Self {
        Self {
            registry,
            factory,
            transactions,
            shards,
            limiters: dashmap::DashMap::new(),
            global_max_message_size,
            global_max_delay_seconds,
        }
    }

    /// Token-bucket check consulted before C3 (spec §9 design note (c)).
    /// Builds the namespace's limiter from its `rateLimitConfig` the
    /// first time it's seen, caching it alongside the namespace cache.
    fn rate_limiter_for(&self, namespace: &str, config: Option<&wal_common::model::RateLimitConfig>) -> NamespaceRateLimiter {
        if let Some(limiter) = self.limiters.get(namespace) {
            return limiter.clone();
        }
        let limiter = NamespaceRateLimiter::new(config);
        self.limiters.insert(namespace.to_owned(), limiter.clone());
        limiter
    }

    #[tracing::instrument(skip_all, fields(namespace = %intent.namespace))]
    pub async fn write_to_log(
        &self,
        intent: WriteIntent,
        api_key: &str,
        trace_id: Option<&str>,
    ) -> Result<WriteToLogResponse, WalError> {
        let operation = classify_operation(&intent);
        let namespace_label = intent.namespace.to_lowercase();
        let start = Instant::now();

        let outcome = self.write_to_log_inner(intent, api_key, trace_id, operation).await;

        let elapsed = start.elapsed().as_secs_f64();
        metrics::histogram!(
            "wal_write_duration_seconds",
            "namespace" => namespace_label.clone(),
            "operation" => operation.as_str()
        )
        .record(elapsed);

        let outcome = match outcome {
            Ok((response, used_backend)) => {
                metrics::counter!("wal_writes_total", "status" => "success").increment(1);
                tracing::info!(
                    namespace = %namespace_label,
                    message_id = %response.message_id,
                    backend = used_backend.as_str(),
                    api_key = %mask_api_key(api_key),
                    status = "success",
                    "wal write accepted"
                );
                Ok(response)
            }
            Err(e) => {
                metrics::counter!(
                    "wal_writes_total",
                    "status" => "error",
                    "error_type" => e.kind.as_str()
                )
                .increment(1);
                tracing::warn!(
                    namespace = %namespace_label,
                    api_key = %mask_api_key(api_key),
                    status = "failed",
                    error = %e.detail,
                    "wal write failed"
                );
                Err(e)
            }
        };

        outcome
    }

    async fn write_to_log_inner(
        &self,
        intent: WriteIntent,
        api_key: &str,
        trace_id: Option<&str>,
        operation: Operation,
    ) -> Result<(WriteToLogResponse, Backend), WalError> {
        // Rate-limit check, consulted before C3. A namespace lookup
        // failure here is swallowed; C3 below will surface the proper
        // `NamespaceNotFound` for an unknown namespace instead.
        let namespace_key = intent.namespace.to_lowercase();
        if let Ok(policy_preview) = self.registry.get(&namespace_key).await {
            let limiter =
                self.rate_limiter_for(&namespace_key, policy_preview.rate_limit_config.as_ref());
            if limiter.is_limited(&namespace_key) {
                return Err(WalError::new(
                    ErrorKind::RateLimit,
                    format!("namespace '{namespace_key}' is rate limited"),
                ));
            }
        }

        // Steps 2-4: validate + enrich (C3), obtaining the resolved policy.
        let validated = validator::validate_and_enrich(
            &self.registry,
            &intent,
            api_key,
            trace_id,
            self.global_max_message_size,
            self.global_max_delay_seconds,
        )
        .await?;
        let (enriched, policy) = (validated.enriched, validated.policy);

        // Step 3: secondary C2.validate beyond schema (message size /
        // delay bound / target type, now that namespace is resolved).
        self.registry.validate(&policy, &intent)?;

        // Step 4: select producer with fallback.
        let (producer, used_backend) = self.select_producer(policy.backend).await?;

        // Step 5: begin transaction.
        let transaction_id = wal_common::identity::generate_transaction_id();
        self.transactions
            .begin(&transaction_id, &enriched.message_id)
            .map_err(|e| WalError::internal(e.to_string()))?;

        // Step 6: build driver payload.
        let partition = self.shards.select(
            &enriched.namespace,
            &policy.shard_config,
            &enriched.message_id,
            &enriched.payload,
        );
        let delay_ms = enriched
            .lifecycle
            .as_ref()
            .and_then(|l| l.delay)
            .map(|d| d * 1000)
            .unwrap_or(0);
        let value = serde_json::to_vec(&enriched)
            .map_err(|e| WalError::internal(format!("failed to serialize enriched message: {e}")))?;
        let mut headers = vec![
            ("content-type".to_owned(), "application/json".to_owned()),
            ("message-id".to_owned(), enriched.message_id.clone()),
            ("namespace".to_owned(), enriched.namespace.clone()),
            ("version".to_owned(), enriched.version.clone()),
            ("request-id".to_owned(), enriched.request_id.clone()),
            ("correlation-id".to_owned(), enriched.correlation_id.clone()),
            ("api-key".to_owned(), mask_api_key(api_key)),
        ];
        if delay_ms > 0 {
            headers.push(("delay".to_owned(), delay_ms.to_string()));
        }
        let message = DriverMessage {
            topic: policy.topic_name.clone(),
            value,
            partition,
            headers,
            delay_ms,
        };

        // Step 7: send.
        let send_result = producer.send(message).await;
        let result = match send_result {
            Ok(result) if result.success => result,
            Ok(_failed_result) => {
                let reason = format!("producer reported failure for {}", used_backend.as_str());
                producer.compensate(&enriched.message_id).await;
                self.transactions.rollback(&transaction_id, &reason);
                return Err(WalError::producer_unavailable(reason));
            }
            Err(e) => {
                let reason = format!("producer error: {e}");
                producer.compensate(&enriched.message_id).await;
                self.transactions.rollback(&transaction_id, &reason);
                return Err(translate_producer_error(e));
            }
        };

        // Step 8: determine durability.
        let durability = durability_status(&result);

        // Step 9: commit.
        self.transactions
            .commit(&transaction_id, &enriched.message_id, durability)
            .map_err(|e| WalError::internal(e.to_string()))?;
        metrics::gauge!("wal_active_messages").increment(1.0);

        // Step 10: build response.
        let has_delay = delay_ms > 0;
        Ok((
            WriteToLogResponse {
                durable: durability,
                message_id: enriched.message_id.clone(),
                transaction_id: Some(transaction_id),
                message: "write accepted".to_owned(),
                timestamp: enriched.timestamp,
                estimated_processing_time_ms: if has_delay { Some(delay_ms) } else { None },
                queue_position: None,
                metadata: Some(ResponseMetadata {
                    request_id: enriched.request_id,
                    namespace: enriched.namespace,
                    durability_status: durability,
                    has_delay,
                    processing_mode: if has_delay {
                        ProcessingMode::Delayed
                    } else {
                        ProcessingMode::Immediate
                    },
                }),
            },
            used_backend,
        ))
    }

    /// Ask C5 for `backend`; probe health. If unhealthy/unavailable,
    /// iterate the fallback list, returning the first healthy producer.
    /// If all fail, surface `ProducerUnavailable` (spec §4.7 step 4).
    async fn select_producer(
        &self,
        backend: Backend,
    ) -> Result<(Arc<dyn Producer>, Backend), WalError> {
        let mut candidates = vec![backend];
        candidates.extend_from_slice(fallback_order(backend));

        let mut last_error = None;
        for candidate in candidates {
            match self.factory.get(candidate).await {
                Ok(producer) => {
                    if producer.health_check().await {
                        return Ok((producer, candidate));
                    }
                    last_error = Some(format!("{candidate:?} is unhealthy"));
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(WalError::producer_unavailable(last_error.unwrap_or_else(
            || "no producer available".to_owned(),
        )))
    }
}

fn translate_producer_error(error: ProducerError) -> WalError {
    match error {
        ProducerError::TargetRefused(detail) => WalError::new(ErrorKind::TargetSystemError, detail),
        ProducerError::Unavailable(detail) => WalError::producer_unavailable(detail),
        ProducerError::Timeout(detail) => WalError::new(ErrorKind::Timeout, detail),
    }
}
