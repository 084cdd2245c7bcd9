pub mod factory;
pub mod pipeline;
pub mod producer;
pub mod producers;
pub mod rate_limit;
pub mod shard;
pub mod transaction;
pub mod validator;

pub use factory::{fallback_order, ProducerBuilder, ProducerFactory};
pub use pipeline::{IngestionPipeline, Operation};
pub use producer::{DriverMessage, Producer, ProducerError, ProducerHealthEntry};
pub use rate_limit::NamespaceRateLimiter;
pub use shard::ShardSelector;
pub use transaction::{TransactionHealth, TransactionOrchestrator};
