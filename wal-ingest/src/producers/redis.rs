//! Redis Streams driver — the canonical driver whose wire format the
//! spec pins down exactly (spec §4.4).
//!
//! Grounded on `feature_flags::redis::{Client, RedisClient}` for the
//! connect-then-wrap-errors shape, and on
//! `capture::sinks::kafka::KafkaContext` for the idea of a context object
//! that feeds a liveness gauge from connection events.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{info, warn};
use wal_common::model::ProducerResult;

use crate::producer::{DriverMessage, HealthState, Producer, ProducerError, ProducerHealthEntry};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// `min(attempt*50ms, 2000ms)` connect backoff (spec §4.4 "Connection
/// policy").
fn backoff_for_attempt(attempt: u32) -> Duration {
    Duration::from_millis((attempt as u64 * 50).min(2000))
}

pub struct RedisProducer {
    client: redis::Client,
    conn: Mutex<Option<redis::aio::MultiplexedConnection>>,
    connected: AtomicBool,
    reconnect_attempts: AtomicU32,
}

impl RedisProducer {
    pub fn new(addr: &str) -> Result<Self, ProducerError> {
        let client = redis::Client::open(addr)
            .map_err(|e| ProducerError::Unavailable(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            connected: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
        })
    }

    /// Lazily connect, retrying with the spec's backoff schedule. Holds
    /// the connection mutex for the duration so concurrent callers don't
    /// race to establish separate connections.
    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, ProducerError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let mut attempt = 0u32;
        loop {
            match self.client.get_multiplexed_async_connection().await {
                Ok(conn) => {
                    self.connected.store(true, Ordering::SeqCst);
                    metrics::gauge!("wal_redis_connection_state").set(1.0);
                    *guard = Some(conn.clone());
                    return Ok(conn);
                }
                Err(e) if attempt < 3 => {
                    attempt += 1;
                    warn!("redis connect attempt {attempt} failed: {e}");
                    tokio::time::sleep(backoff_for_attempt(attempt)).await;
                }
                Err(e) => {
                    self.connected.store(false, Ordering::SeqCst);
                    metrics::gauge!("wal_redis_connection_state").set(0.0);
                    return Err(ProducerError::Unavailable(format!(
                        "redis connection failed after {attempt} attempts: {e}"
                    )));
                }
            }
        }
    }

    /// Drop a cached connection so the next call reconnects; used when a
    /// command fails with `READONLY` (stale connection to a demoted
    /// primary, spec §4.4 "reconnect on errors containing READONLY").
    async fn invalidate_connection(&self) {
        let mut guard = self.conn.lock().await;
        *guard = None;
        self.connected.store(false, Ordering::SeqCst);
        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
    }

    fn is_readonly_error(err: &redis::RedisError) -> bool {
        err.to_string().contains("READONLY")
    }
}

#[async_trait]
impl Producer for RedisProducer {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn send(&self, message: DriverMessage) -> Result<ProducerResult, ProducerError> {
        let mut conn = self.connection().await?;

        let stream_key = format!("wal:{}:messages", message.topic);
        let mut entry: Vec<(String, String)> = vec![
            ("value".to_owned(), String::from_utf8_lossy(&message.value).into_owned()),
            ("partition".to_owned(), message.partition.to_string()),
            ("timestamp".to_owned(), Utc::now().to_rfc3339()),
            ("producer".to_owned(), "redis-producer".to_owned()),
        ];
        for (name, value) in &message.headers {
            entry.push((format!("header_{name}"), value.clone()));
        }

        let result = tokio::time::timeout(COMMAND_TIMEOUT, conn.xadd(&stream_key, "*", &entry))
            .await
            .map_err(|_| ProducerError::Timeout(format!("xadd to {stream_key} timed out")))?;

        let entry_id: String = match result {
            Ok(id) => id,
            Err(e) if Self::is_readonly_error(&e) => {
                self.invalidate_connection().await;
                return Err(ProducerError::Unavailable(format!(
                    "redis stream became read-only: {e}"
                )));
            }
            Err(e) => {
                return Err(ProducerError::TargetRefused(format!(
                    "xadd to {stream_key} failed: {e}"
                )))
            }
        };

        let ttl = message
            .headers
            .iter()
            .find(|(k, _)| k == "ttl")
            .and_then(|(_, v)| v.parse::<i64>().ok())
            .filter(|t| *t > 0);
        if let Some(ttl_secs) = ttl {
            if let Err(e) = conn.expire::<_, ()>(&stream_key, ttl_secs).await {
                warn!("failed to set ttl on {stream_key}: {e}");
            }
        }

        if message.delay_ms > 0 {
            let delayed_key = format!("wal:{}:delayed", message.topic);
            let scheduled_for = Utc::now() + chrono::Duration::milliseconds(message.delay_ms as i64);
            let message_id = message
                .headers
                .iter()
                .find(|(k, _)| k == "message-id")
                .map(|(_, v)| v.clone())
                .unwrap_or_default();
            let payload = serde_json::json!({
                "messageId": message_id,
                "originalMessage": String::from_utf8_lossy(&message.value),
                "scheduledFor": scheduled_for.to_rfc3339(),
                "createdAt": Utc::now().to_rfc3339(),
            });
            let score = scheduled_for.timestamp_millis() as f64;
            if let Err(e) = conn
                .zadd::<_, _, _, ()>(&delayed_key, payload.to_string(), score)
                .await
            {
                warn!("failed to schedule delayed entry in {delayed_key}: {e}");
            }
        }

        info!("appended to {stream_key} as {entry_id}");

        Ok(ProducerResult {
            message_id: Some(entry_id),
            success: true,
            partition: Some(message.partition),
            offset: None,
            timestamp: Utc::now(),
            durable: true,
            scheduled: message.delay_ms > 0,
            metadata: None,
        })
    }

    async fn health_check(&self) -> bool {
        match self.connection().await {
            Ok(mut conn) => {
                let pong = tokio::time::timeout(
                    COMMAND_TIMEOUT,
                    redis::cmd("PING").query_async::<_, String>(&mut conn),
                )
                .await;
                matches!(pong, Ok(Ok(_)))
            }
            Err(_) => false,
        }
    }

    async fn health_status(&self) -> ProducerHealthEntry {
        let healthy = self.health_check().await;
        let reconnects = self.reconnect_attempts.load(Ordering::SeqCst);
        let state = if !healthy {
            HealthState::Unhealthy
        } else if reconnects > 0 {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };
        if healthy {
            self.reconnect_attempts.store(0, Ordering::SeqCst);
        }
        ProducerHealthEntry {
            backend: "redis",
            state,
            detail: match state {
                HealthState::Healthy => None,
                HealthState::Degraded => Some(format!(
                    "reachable after {reconnects} reconnect(s) since last window"
                )),
                HealthState::Unhealthy => {
                    Some(format!("reconnect attempts so far: {reconnects}"))
                }
            },
        }
    }

    async fn disconnect(&self) {
        let mut guard = self.conn.lock().await;
        *guard = None;
        self.connected.store(false, Ordering::SeqCst);
    }
}
