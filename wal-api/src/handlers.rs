//! The HTTP surface (spec §6): `POST /wal/write` plus read-only status
//! routes for namespaces/transactions. Request framing, API-key
//! extraction and request-id propagation are the spec's declared
//! out-of-scope collaborator (spec §1); this module is that collaborator,
//! grounded on `capture::router`/`capture::api` for the
//! state-plus-handler-plus-`IntoResponse` shape.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use wal_common::error::WalError;
use wal_common::identity;
use wal_common::model::{Namespace, WriteIntent};
use wal_ingest::IngestionPipeline;

use crate::auth::ApiKeyAuthorizer;

const API_KEY_HEADER: &str = "x-api-key";
const REQUEST_ID_HEADER: &str = "x-request-id";
const TRACE_ID_HEADER: &str = "x-trace-id";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestionPipeline>,
    pub authorizer: ApiKeyAuthorizer,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/wal/write", post(write))
        .route("/wal/namespaces/:name", get(get_namespace))
        .route("/wal/transactions/:id", get(get_transaction))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn write(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(intent): Json<WriteIntent>,
) -> Result<Response, WalError> {
    let api_key = header_str(&headers, API_KEY_HEADER).unwrap_or("").to_owned();
    let trace_id = header_str(&headers, TRACE_ID_HEADER).map(str::to_owned);
    let request_id = header_str(&headers, REQUEST_ID_HEADER)
        .map(str::to_owned)
        .unwrap_or_else(identity::generate_request_id);

    state.authorizer.authorize(&api_key)?;

    let body = state
        .pipeline
        .write_to_log(intent, &api_key, trace_id.as_deref())
        .await?;

    let mut response = (StatusCode::ACCEPTED, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    Ok(response)
}

async fn get_namespace(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Namespace>, WalError> {
    let namespace = state.pipeline.registry.get(&name.to_lowercase()).await?;
    Ok(Json(namespace))
}

#[derive(Serialize)]
struct TransactionStatusResponse {
    transaction_id: String,
    status: &'static str,
}

async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Response {
    let active = state.pipeline.transactions.is_active(&transaction_id);
    let status = if active { "active" } else { "not_found" };
    let code = if active {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (
        code,
        Json(TransactionStatusResponse {
            transaction_id,
            status,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use wal_common::model::{Backend, BackoffStrategy, RetryPolicy, ShardConfig};
    use wal_ingest::factory::ProducerBuilder;
    use wal_ingest::producers::MockProducer;
    use wal_ingest::{Producer, ProducerError, ProducerFactory, ShardSelector, TransactionOrchestrator};
    use wal_registry::{InMemoryNamespaceStore, NamespaceRegistry};

    struct FixedBuilder {
        producers: dashmap::DashMap<&'static str, Arc<dyn Producer>>,
    }

    #[async_trait]
    impl ProducerBuilder for FixedBuilder {
        async fn build(&self, backend: Backend) -> Result<Arc<dyn Producer>, ProducerError> {
            self.producers
                .get(backend.as_str())
                .map(|e| e.clone())
                .ok_or_else(|| ProducerError::Unavailable("not configured".to_owned()))
        }
    }

    fn namespace(name: &str) -> Namespace {
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
            schema_rules: None,
        }
    }

    fn test_state() -> AppState {
        let registry = Arc::new(NamespaceRegistry::new(Arc::new(
            InMemoryNamespaceStore::new().with(namespace("ns")),
        )));
        let map = dashmap::DashMap::new();
        map.insert(
            "redis",
            Arc::new(MockProducer::new("redis")) as Arc<dyn Producer>,
        );
        let factory = Arc::new(ProducerFactory::new(Arc::new(FixedBuilder { producers: map })));
        let pipeline = Arc::new(IngestionPipeline::new(
            registry,
            factory,
            Arc::new(TransactionOrchestrator::new()),
            Arc::new(ShardSelector::new()),
        ));
        AppState {
            pipeline,
            authorizer: ApiKeyAuthorizer::new(vec![]),
        }
    }

    fn intent_body(namespace: &str) -> serde_json::Value {
        serde_json::json!({
            "namespace": namespace,
            "payload": {"k": "v"},
            "target": {
                "type": "cache",
                "identifier": "r1",
                "config": {"regions": ["us-east-1"], "operation": "SET"}
            }
        })
    }

    #[tokio::test]
    async fn write_accepts_a_valid_request() {
        let app = router(test_state());
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/wal/write")
            .header("content-type", "application/json")
            .header(API_KEY_HEADER, "a".repeat(16))
            .body(axum::body::Body::from(intent_body("ns").to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn write_rejects_unknown_namespace_with_404() {
        let app = router(test_state());
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/wal/write")
            .header("content-type", "application/json")
            .header(API_KEY_HEADER, "a".repeat(16))
            .body(axum::body::Body::from(intent_body("missing").to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_namespace_returns_the_policy() {
        let app = router(test_state());
        let request = axum::http::Request::builder()
            .method("GET")
            .uri("/wal/namespaces/ns")
            .body(axum::body::Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Namespace = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.name, "ns");
    }

    #[tokio::test]
    async fn get_transaction_reports_not_found_for_unknown_id() {
        let app = router(test_state());
        let request = axum::http::Request::builder()
            .method("GET")
            .uri("/wal/transactions/txn_does_not_exist")
            .body(axum::body::Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn write_forbids_keys_outside_the_allowlist() {
        let mut state = test_state();
        state.authorizer = ApiKeyAuthorizer::new(vec!["b".repeat(16)]);
        let app = router(state);
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/wal/write")
            .header("content-type", "application/json")
            .header(API_KEY_HEADER, "a".repeat(16))
            .body(axum::body::Body::from(intent_body("ns").to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
