//! Transaction Orchestrator (C6): an in-process, non-persisted
//! coordination map over single send attempts (spec §4.6, and spec §9
//! "Transactional state held in a process-local map" — the log itself,
//! not this map, is the durable artifact).
//!
//! Grounded on `hook_common::pgqueue`'s Job state-transition shape
//! (begin/complete/fail), reimagined over a `dashmap::DashMap` instead of
//! Postgres rows, and on `hook_worker::worker`'s periodic-task-with-
//! liveness-report pattern for the sweep loop.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use wal_common::error::ErrorKind;
use wal_common::model::DurabilityStatus;

const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(30);
const DEGRADED_THRESHOLD: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionHealth {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone)]
struct ActiveTransaction {
    message_id: String,
    started_at: Instant,
}

#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("transaction '{0}' is already active")]
    DuplicateBegin(String),
    #[error("transaction '{0}' is not active")]
    NotActive(String),
    #[error("commit assertion failed: {0}")]
    CommitInvalid(String),
}

pub struct TransactionOrchestrator {
    active: DashMap<String, ActiveTransaction>,
    timeout: Duration,
}

impl TransactionOrchestrator {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TRANSACTION_TIMEOUT)
    }

    /// `WAL_TRANSACTION_TIMEOUT_MS` overrides the spec's 30s default
    /// (spec §4.6, §6 "Environment surface").
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            active: DashMap::new(),
            timeout,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn health(&self) -> TransactionHealth {
        if self.active.len() < DEGRADED_THRESHOLD {
            TransactionHealth::Healthy
        } else {
            TransactionHealth::Degraded
        }
    }

    /// `begin(ctx)`: insert into the active set keyed by `transactionId`;
    /// fail if duplicate (spec §4.6).
    pub fn begin(&self, transaction_id: &str, message_id: &str) -> Result<(), TransactionError> {
        let entry = ActiveTransaction {
            message_id: message_id.to_owned(),
            started_at: Instant::now(),
        };
        match self.active.entry(transaction_id.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(TransactionError::DuplicateBegin(transaction_id.to_owned()))
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(entry);
                Ok(())
            }
        }
    }

    /// `commit(txId, {messageId, durabilityStatus})`: asserts the
    /// message id matches what `begin` recorded and that
    /// `durabilityStatus` is one of the four valid values, then removes
    /// the entry. On assertion failure, auto-invokes `rollback` and
    /// surfaces the error (spec §4.6).
    pub fn commit(
        &self,
        transaction_id: &str,
        message_id: &str,
        durability_status: DurabilityStatus,
    ) -> Result<(), TransactionError> {
        let recorded = match self.active.get(transaction_id) {
            Some(entry) => entry.message_id.clone(),
            None => return Err(TransactionError::NotActive(transaction_id.to_owned())),
        };

        if recorded != message_id {
            let reason = format!(
                "Commit failed: message id mismatch, expected '{recorded}' got '{message_id}'"
            );
            self.rollback(transaction_id, &reason);
            return Err(TransactionError::CommitInvalid(reason));
        }

        if matches!(durability_status, DurabilityStatus::Unknown) {
            let reason = "Commit failed: unresolved durability status".to_owned();
            self.rollback(transaction_id, &reason);
            return Err(TransactionError::CommitInvalid(reason));
        }

        self.active.remove(transaction_id);
        metrics::counter!(
            "transactions_total",
            "status" => "committed",
            "durability" => durability_status.as_str()
        )
        .increment(1);
        Ok(())
    }

    /// `rollback(txId, reason)`: removes the entry even if a driver
    /// compensation hook (run by the caller, best-effort, before this is
    /// invoked) failed. The loser of a concurrent commit/rollback race
    /// observes `NotActive` and is a no-op with a warning (spec §5).
    pub fn rollback(&self, transaction_id: &str, reason: &str) {
        if self.active.remove(transaction_id).is_none() {
            tracing::warn!(
                transaction_id,
                "rollback on a transaction that is not active (lost a commit/rollback race)"
            );
            return;
        }
        let category = ErrorKind::categorize_reason(reason);
        metrics::counter!(
            "transactions_total",
            "status" => "rolled_back",
            "reason" => category
        )
        .increment(1);
    }

    /// Snapshot the keys that have exceeded the 30s timeout, then roll
    /// each back individually — taking a snapshot first avoids holding a
    /// global lock across the whole sweep (spec §5).
    pub fn sweep_orphaned(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .active
            .iter()
            .filter(|e| now.duration_since(e.value().started_at) > self.timeout)
            .map(|e| e.key().clone())
            .collect();

        for transaction_id in &expired {
            self.rollback(transaction_id, "Transaction timeout - orphaned cleanup");
        }
        expired.len()
    }

    /// Background loop: sweep every `timeout/2` (default 15s, per the
    /// transaction timeout's half-life) for orphaned entries. Sweep
    /// failures (there are none today, but the shape allows future
    /// fallible compensation) are logged and never abort the loop (spec
    /// §4.6). Reports into `liveness` on every tick, mirroring
    /// `hook-worker`'s poll-loop liveness reporting.
    pub async fn run_sweeper(&self, liveness: Option<health::HealthHandle>) {
        let mut interval = tokio::time::interval(self.timeout / 2);
        loop {
            interval.tick().await;
            let reclaimed = self.sweep_orphaned();
            if reclaimed > 0 {
                tracing::info!(reclaimed, "swept orphaned transactions");
            }
            if let Some(handle) = &liveness {
                handle.report_healthy().await;
            }
        }
    }

    /// Whether `transaction_id` is currently in the active set, used by
    /// the (out-of-core) HTTP status route for `GET
    /// /wal/transactions/:id`.
    pub fn is_active(&self, transaction_id: &str) -> bool {
        self.active.contains_key(transaction_id)
    }
}

impl Default for TransactionOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}
