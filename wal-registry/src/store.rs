//! The abstract namespace store and its two implementations.
//!
//! Grounded on `hook_common::pgqueue::PgQueue` for the Postgres-backed
//! implementation (same `sqlx::PgPool` + typed-error shape, same use of
//! `sqlx::types::Json` to hold a nested config blob), and on
//! `feature_flags::redis::{Client, RedisClient, MockRedisClient}` for the
//! trait/mock pairing itself.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use wal_common::model::Namespace;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed with: {0}")]
    Connection(sqlx::Error),
    #[error("query failed with: {0}")]
    Query(sqlx::Error),
    #[error("stored policy for '{0}' failed to deserialize: {1}")]
    Corrupt(String, serde_json::Error),
}

/// Namespace CRUD/admin and seeding are out of scope (spec §1); this
/// trait is the narrow read interface the ingestion path is allowed to
/// use against that external system.
#[async_trait]
pub trait NamespaceStore: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Option<Namespace>, StoreError>;
}

/// Reads namespace policy rows stored as a single JSONB blob per row,
/// the same pattern `PgQueue::dequeue` uses `sqlx::types::Json` for
/// `JobParameters`.
pub struct PostgresNamespaceStore {
    pool: PgPool,
}

impl PostgresNamespaceStore {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(StoreError::Connection)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NamespaceStore for PostgresNamespaceStore {
    async fn fetch(&self, name: &str) -> Result<Option<Namespace>, StoreError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT policy FROM namespaces WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::Query)?;

        match row {
            None => Ok(None),
            Some((policy,)) => serde_json::from_value(policy)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(name.to_owned(), e)),
        }
    }
}

/// An in-process store for tests and for embedding the registry in a
/// binary without a database, mirroring
/// `feature_flags::redis::MockRedisClient`.
#[derive(Default, Clone)]
pub struct InMemoryNamespaceStore {
    namespaces: std::collections::HashMap<String, Namespace>,
}

impl InMemoryNamespaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, namespace: Namespace) -> Self {
        self.namespaces.insert(namespace.name.clone(), namespace);
        self
    }
}

#[async_trait]
impl NamespaceStore for InMemoryNamespaceStore {
    async fn fetch(&self, name: &str) -> Result<Option<Namespace>, StoreError> {
        Ok(self.namespaces.get(name).cloned())
    }
}
