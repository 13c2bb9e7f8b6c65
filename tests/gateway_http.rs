use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use house_price_gateway::utils::test_support::sample_record_json;
use house_price_gateway::{
    ApiResponse, AuditStore, AuditStoreError, GatewayHttpState, HousingRecord, InferenceBackend,
    InferenceError, InferenceOutcome, InferencePayload, PredictionService, SqliteStore,
};
use serde_json::{Value, json};
use time::OffsetDateTime;
use tower::util::ServiceExt;

struct FixedBackend {
    prediction: f64,
    calls: AtomicUsize,
}

impl FixedBackend {
    fn new(prediction: f64) -> Self {
        Self {
            prediction,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl InferenceBackend for FixedBackend {
    async fn invoke(&self, _payload: &InferencePayload) -> Result<InferenceOutcome, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(InferenceOutcome {
            prediction: self.prediction,
            duration: Duration::from_millis(5),
        })
    }
}

struct UnavailableStore;

#[async_trait]
impl AuditStore for UnavailableStore {
    async fn begin(
        &self,
        _record: &HousingRecord,
        _created_at: OffsetDateTime,
    ) -> Result<i64, AuditStoreError> {
        Err(AuditStoreError::Timestamp("store offline".to_string()))
    }

    async fn complete(
        &self,
        _id: i64,
        _prediction: f64,
        _inference_time: Duration,
        _completed_at: OffsetDateTime,
    ) -> Result<(), AuditStoreError> {
        Err(AuditStoreError::Timestamp("store offline".to_string()))
    }
}

async fn sqlite_store(dir: &tempfile::TempDir) -> SqliteStore {
    let store = SqliteStore::new(dir.path().join("audit.sqlite"));
    store.init().await.expect("init");
    store
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_envelope(response: axum::response::Response) -> ApiResponse {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).expect("envelope")
}

#[tokio::test]
async fn predict_returns_price_and_records_audit_row() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = sqlite_store(&dir).await;
    let backend = Arc::new(FixedBackend::new(500_000.0));
    let service = PredictionService::new(Arc::new(store.clone()), backend.clone());
    let app = house_price_gateway::router(GatewayHttpState::new(service));

    let response = app
        .oneshot(post_json("/predict", &sample_record_json()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let envelope = read_envelope(response).await;
    assert_eq!(envelope.status, 200);
    assert_eq!(envelope.message, "House price prediction successful");
    assert_eq!(
        envelope.response,
        Some(json!({"prediction": 500000.0, "unit": "GBP(£)"}))
    );

    let logs = store.list_prediction_logs(10).await.expect("logs");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].prediction_response, Some(500_000.0));
    assert!(logs[0].inference_time.is_some());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn repeated_predictions_create_distinct_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = sqlite_store(&dir).await;
    let service = PredictionService::new(
        Arc::new(store.clone()),
        Arc::new(FixedBackend::new(500_000.0)),
    );
    let app = house_price_gateway::router(GatewayHttpState::new(service));

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_json("/predict", &sample_record_json()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let logs = store.list_prediction_logs(10).await.expect("logs");
    assert_eq!(logs.len(), 2);
    assert_ne!(logs[0].id, logs[1].id);
    assert!(logs.iter().all(|log| log.prediction_response == Some(500_000.0)));
}

#[tokio::test]
async fn invalid_furnishing_status_is_rejected_without_audit_row() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = sqlite_store(&dir).await;
    let backend = Arc::new(FixedBackend::new(1.0));
    let service = PredictionService::new(Arc::new(store.clone()), backend.clone());
    let app = house_price_gateway::router(GatewayHttpState::new(service));

    let mut body = sample_record_json();
    body["furnishingstatus"] = json!("half-furnished");
    let response = app.oneshot(post_json("/predict", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let envelope = read_envelope(response).await;
    assert_eq!(envelope.status, 422);
    assert_eq!(
        envelope.response.as_ref().and_then(|detail| detail["field"].as_str()),
        Some("furnishingstatus")
    );

    assert!(store.list_prediction_logs(10).await.expect("logs").is_empty());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_json_is_a_validation_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let service = PredictionService::new(
        Arc::new(sqlite_store(&dir).await),
        Arc::new(FixedBackend::new(1.0)),
    );
    let app = house_price_gateway::router(GatewayHttpState::new(service));

    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn store_failure_returns_server_error_without_calling_backend() {
    let backend = Arc::new(FixedBackend::new(1.0));
    let service = PredictionService::new(Arc::new(UnavailableStore), backend.clone());
    let app = house_price_gateway::router(GatewayHttpState::new(service));

    let response = app
        .oneshot(post_json("/predict", &sample_record_json()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let envelope = read_envelope(response).await;
    assert_eq!(envelope.status, 500);
    assert!(envelope.message.contains("persistence"));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn health_ignores_dependency_failures() {
    let service = PredictionService::new(
        Arc::new(UnavailableStore),
        Arc::new(FixedBackend::new(1.0)),
    );
    let app = house_price_gateway::router(GatewayHttpState::new(service));

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed, json!({"status": 200, "message": "success", "response": null}));
}

#[tokio::test]
async fn data_echoes_the_canonical_record() {
    let backend = Arc::new(FixedBackend::new(1.0));
    let service = PredictionService::new(Arc::new(UnavailableStore), backend.clone());
    let app = house_price_gateway::router(GatewayHttpState::new(service));

    let response = app
        .clone()
        .oneshot(post_json("/data", &sample_record_json()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let envelope = read_envelope(response).await;
    let record = envelope.response.expect("record");
    assert_eq!(record["guestroom"], "no");
    assert_eq!(record["furnishingstatus"], "semi-furnished");
    assert_eq!(record["bedrooms"], 4);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

    let mut body = sample_record_json();
    body["stories"] = json!(5);
    let response = app.oneshot(post_json("/data", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unknown_routes_use_the_envelope() {
    let service = PredictionService::new(
        Arc::new(UnavailableStore),
        Arc::new(FixedBackend::new(1.0)),
    );
    let app = house_price_gateway::router(GatewayHttpState::new(service));

    let request = Request::builder()
        .method("GET")
        .uri("/nope")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_envelope(response).await.status, 404);
}
