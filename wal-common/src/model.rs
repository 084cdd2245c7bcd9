//! Shared DTOs (spec §3, §6). Grounded on the shape of
//! `hook_common::webhook::{WebhookJobParameters, WebhookJobMetadata}` —
//! small, serde-derived, no business logic on the struct itself.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `Namespace.backend` — which kind of backend log a namespace writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Kafka,
    Sqs,
    Redis,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Kafka => "kafka",
            Backend::Sqs => "sqs",
            Backend::Redis => "redis",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Exponential,
    Linear,
    Constant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_strategy: BackoffStrategy,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_strategy: BackoffStrategy::Exponential,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardStrategy {
    Hash,
    RoundRobin,
    Random,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomShardLogic {
    /// Dot-notation path into `payload` used to extract the partition key.
    pub extract_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    pub strategy: ShardStrategy,
    pub partition_count: u32,
    #[serde(default)]
    pub custom_logic: Option<CustomShardLogic>,
    /// Legacy override: always hash modulo 10 regardless of
    /// `partition_count`, reproducing the source's `% 10` behavior
    /// (spec §9 "Partition modulus ... is a design smell" — see
    /// DESIGN.md's Open Question decision).
    #[serde(default)]
    pub legacy_fixed_modulus: bool,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            strategy: ShardStrategy::Hash,
            partition_count: 10,
            custom_logic: None,
            legacy_fixed_modulus: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Database,
    Cache,
    Http,
    Grpc,
    Queue,
    FileSystem,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(rename = "type")]
    pub target_type: TargetType,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default = "serde_json::Value::default")]
    pub config: serde_json::Value,
}

impl TargetConfig {
    /// `{regions: [...]}` count for a cache target, used by C7 to detect
    /// multi-region replication operations.
    pub fn region_count(&self) -> usize {
        self.config
            .get("regions")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0)
    }
}

/// One `TargetConfig`, or an array of them (spec §3 "target (one or array
/// of TargetConfig)").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Targets {
    One(TargetConfig),
    Many(Vec<TargetConfig>),
}

impl Targets {
    pub fn iter(&self) -> Box<dyn Iterator<Item = &TargetConfig> + '_> {
        match self {
            Targets::One(t) => Box::new(std::iter::once(t)),
            Targets::Many(ts) => Box::new(ts.iter()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Targets::One(_) => 1,
            Targets::Many(ts) => ts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    #[serde(default)]
    pub burst: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyRule {
    #[serde(rename = "type")]
    pub property_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaRules {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: HashMap<String, PropertyRule>,
}

/// A namespace policy record (spec §3 "Namespace (policy record)").
/// Immutable on the write path: mutated only by the (out-of-scope) admin
/// collaborator, cached here with a TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    pub enabled: bool,
    pub backend: Backend,
    pub topic_name: String,
    pub retry_policy: RetryPolicy,
    pub shard_config: ShardConfig,
    #[serde(default)]
    pub target_config: Option<TargetConfig>,
    #[serde(default)]
    pub rate_limit_config: Option<RateLimitConfig>,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    #[serde(default = "default_max_delay_seconds")]
    pub max_delay_seconds: u64,
    #[serde(default)]
    pub schema_rules: Option<SchemaRules>,
}

fn default_max_message_size() -> usize {
    1024 * 1024
}

fn default_max_delay_seconds() -> u64 {
    86_400
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lifecycle {
    #[serde(default)]
    pub delay: Option<u64>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

/// The inbound DTO (spec §3 "WriteIntent (DTO in)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteIntent {
    pub namespace: String,
    pub payload: serde_json::Value,
    pub target: Targets,
    #[serde(default)]
    pub lifecycle: Option<Lifecycle>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageStatus {
    Pending,
}

/// The DTO plus identity, timing, and tracing fields (spec §3
/// "EnrichedMessage"). Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedMessage {
    pub message_id: String,
    pub correlation_id: String,
    #[serde(default)]
    pub trace_id: Option<String>,
    pub request_id: String,

    pub namespace: String,
    pub payload: serde_json::Value,
    pub target: Targets,
    #[serde(default)]
    pub lifecycle: Option<Lifecycle>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,

    /// Only the full key in audit context; everywhere else callers should
    /// use `crate::mask::mask_api_key` instead of reading this directly.
    #[serde(skip_serializing)]
    pub api_key: String,

    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub attempt_count: u32,
    pub status: MessageStatus,
}

/// The four-valued durability descriptor (GLOSSARY) plus `unknown` for
/// responses where none of the other four could be established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityStatus {
    Persisted,
    Scheduled,
    Acknowledged,
    Failed,
    Unknown,
}

impl DurabilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurabilityStatus::Persisted => "persisted",
            DurabilityStatus::Scheduled => "scheduled",
            DurabilityStatus::Acknowledged => "acknowledged",
            DurabilityStatus::Failed => "failed",
            DurabilityStatus::Unknown => "unknown",
        }
    }
}

/// What a `Producer` returns from `send` (spec §3 "ProducerResult").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerResult {
    pub message_id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub partition: Option<u32>,
    #[serde(default)]
    pub offset: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub durable: bool,
    #[serde(default)]
    pub scheduled: bool,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

/// The outbound response (spec §6 "Response (WriteToLogResponse)").
#[derive(Debug, Clone, Serialize)]
pub struct WriteToLogResponse {
    pub durable: DurabilityStatus,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_processing_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    Immediate,
    Delayed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    pub request_id: String,
    pub namespace: String,
    pub durability_status: DurabilityStatus,
    pub has_delay: bool,
    pub processing_mode: ProcessingMode,
}

/// Canonical-JSON byte length of a payload, used against
/// `maxMessageSize` (spec §3 "Identity invariants"). `serde_json`'s
/// default `Map` is key-sorted (the `preserve_order` feature is off),
/// so `to_vec` already yields a canonical encoding.
pub fn canonical_json_len(value: &serde_json::Value) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}
