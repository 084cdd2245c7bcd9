//! Process entry point: wire configuration into the storage/producer
//! graph, merge the write-path router with metrics and health routes,
//! and serve (SPEC_FULL.md §10.3, §10.5). Grounded on
//! `hook-worker::main`'s register-components-then-spawn-background-tasks
//! shape, generalized from one worker loop to the producer factory's
//! health sampler plus the transaction sweeper.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use envconfig::Envconfig;

use health::HealthRegistry;
use wal_api::auth::ApiKeyAuthorizer;
use wal_api::config::Config;
use wal_api::handlers::{self, AppState};
use wal_common::model::Backend;
use wal_ingest::factory::{ConfiguredProducerBuilder, ProducerBuilder};
use wal_ingest::producers::{KafkaProducer, RedisProducer, SqsProducer};
use wal_ingest::{IngestionPipeline, Producer, ProducerFactory, ShardSelector, TransactionOrchestrator};
use wal_registry::{InMemoryNamespaceStore, NamespaceRegistry, NamespaceStore, PostgresNamespaceStore};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("Invalid configuration");

    let store: Arc<dyn NamespaceStore> = match &config.database_url {
        Some(url) => Arc::new(
            PostgresNamespaceStore::new(url)
                .await
                .expect("failed to connect to the namespace store"),
        ),
        None => {
            tracing::warn!("DATABASE_URL not set, running against the in-memory namespace store");
            Arc::new(InMemoryNamespaceStore::new())
        }
    };
    let registry = Arc::new(NamespaceRegistry::new(store));

    let builder = build_producer_builder(&config);
    let factory = Arc::new(ProducerFactory::new(builder));
    let transactions = Arc::new(TransactionOrchestrator::with_timeout(
        config.wal_transaction_timeout_ms.0,
    ));
    let shards = Arc::new(ShardSelector::new());

    let pipeline = Arc::new(IngestionPipeline::with_limits(
        registry,
        factory.clone(),
        transactions.clone(),
        shards,
        config.wal_max_message_size,
        config.wal_max_delay_seconds,
    ));

    let liveness = HealthRegistry::new("liveness");
    let factory_liveness = liveness
        .register("producer_factory".to_string(), Duration::from_secs(90))
        .await;
    let sweeper_liveness = liveness
        .register("transaction_sweeper".to_string(), Duration::from_secs(90))
        .await;

    tokio::task::spawn({
        let factory = factory.clone();
        async move { factory.run_health_sampler(Some(factory_liveness)).await }
    });
    tokio::task::spawn({
        let transactions = transactions.clone();
        async move { transactions.run_sweeper(Some(sweeper_liveness)).await }
    });

    let state = AppState {
        pipeline,
        authorizer: ApiKeyAuthorizer::new(config.valid_api_keys.0.clone()),
    };

    let router = handlers::router(state)
        .merge(wal_common::metrics::setup_metrics_router())
        .route("/_readiness", get(|| async { "ok" }))
        .route(
            "/_liveness",
            get(move || {
                let liveness = liveness.clone();
                async move { liveness.get_status() }
            }),
        );

    let bind = config.bind();
    tracing::info!(%bind, "starting wal-api");
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(factory))
        .await?;

    Ok(())
}

/// Wait for SIGTERM/Ctrl-C, then drain every instantiated producer
/// before the server stops accepting the shutdown (spec §4.5).
async fn shutdown_signal(factory: Arc<ProducerFactory>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining producers");
    factory.shutdown().await;
}

/// Wire real drivers behind the backends named in config; a backend with
/// no matching env var is simply left unconfigured; `ProducerFactory`
/// surfaces `Unavailable` for it on first use (spec §4.5).
fn build_producer_builder(config: &Config) -> Arc<dyn ProducerBuilder> {
    let mut builder = ConfiguredProducerBuilder::new();

    let redis_url = config.redis_url.clone();
    builder = builder.with_backend(Backend::Redis, move || {
        let redis_url = redis_url.clone();
        async move {
            let producer = RedisProducer::new(&redis_url)?;
            Ok(Arc::new(producer) as Arc<dyn Producer>)
        }
    });

    if let Some(hosts) = config.kafka_hosts.clone() {
        builder = builder.with_backend(Backend::Kafka, move || {
            let hosts = hosts.clone();
            async move {
                let producer = KafkaProducer::new(&hosts)?;
                Ok(Arc::new(producer) as Arc<dyn Producer>)
            }
        });
    }

    if let Some(prefix) = config.sqs_queue_url_prefix.clone() {
        builder = builder.with_backend(Backend::Sqs, move || {
            let prefix = prefix.clone();
            async move {
                let producer = SqsProducer::new(&prefix).await;
                Ok(Arc::new(producer) as Arc<dyn Producer>)
            }
        });
    }

    Arc::new(builder)
}
