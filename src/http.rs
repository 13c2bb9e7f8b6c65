//! HTTP surface of the gateway.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::routing::{get, post};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Instrument as _;

use crate::error::PredictionError;
use crate::record::ValidationError;
use crate::service::PredictionService;

static REQUEST_ID_SEQ: AtomicU64 = AtomicU64::new(0);

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Response envelope shared by every endpoint, including failures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    pub message: String,
    pub response: Option<Value>,
}

impl ApiResponse {
    fn new(status: StatusCode, message: impl Into<String>, response: Option<Value>) -> Self {
        Self {
            status: status.as_u16(),
            message: message.into(),
            response,
        }
    }
}

type HttpReply = (StatusCode, HeaderMap, Json<ApiResponse>);

#[derive(Clone)]
pub struct GatewayHttpState {
    service: PredictionService,
}

impl GatewayHttpState {
    pub fn new(service: PredictionService) -> Self {
        Self { service }
    }
}

pub fn router(state: GatewayHttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/data", post(echo_data))
        .fallback(fallback)
        .with_state(state)
}

async fn health() -> Json<ApiResponse> {
    Json(ApiResponse::new(StatusCode::OK, "success", None))
}

async fn predict(
    State(state): State<GatewayHttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> HttpReply {
    let request_id = request_id(&headers);
    let span = tracing::info_span!("predict", request_id = %request_id);

    async move {
        let result = match parse_body(&body) {
            Ok(raw) => state.service.predict(&raw).await,
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(prediction) => {
                let body = ApiResponse::new(
                    StatusCode::OK,
                    "House price prediction successful",
                    Some(serde_json::json!({
                        "prediction": prediction.price,
                        "unit": prediction.unit,
                    })),
                );
                reply(StatusCode::OK, &request_id, body)
            }
            Err(err) => {
                let (status, body) = map_prediction_error(err);
                reply(status, &request_id, body)
            }
        }
    }
    .instrument(span)
    .await
}

/// Validates a record and echoes its canonical form without calling the model.
async fn echo_data(
    State(state): State<GatewayHttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> HttpReply {
    let request_id = request_id(&headers);
    let validated = parse_body(&body)
        .map_err(PredictionError::from)
        .and_then(|raw| state.service.validate(&raw));
    match validated {
        Ok(record) => echo_reply(&request_id, serde_json::to_value(&record)),
        Err(err) => {
            let (status, body) = map_prediction_error(err);
            reply(status, &request_id, body)
        }
    }
}

fn echo_reply(request_id: &str, encoded: serde_json::Result<Value>) -> HttpReply {
    match encoded {
        Ok(echoed) => {
            let body = ApiResponse::new(StatusCode::OK, "success", Some(echoed));
            reply(StatusCode::OK, request_id, body)
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to encode validated record");
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            let body = ApiResponse::new(status, format!("failed to encode record: {err}"), None);
            reply(status, request_id, body)
        }
    }
}

async fn fallback() -> (StatusCode, Json<ApiResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::new(StatusCode::NOT_FOUND, "not found", None)),
    )
}

fn parse_body(body: &[u8]) -> Result<Value, ValidationError> {
    serde_json::from_slice(body)
        .map_err(|err| ValidationError::new("body", format!("invalid JSON: {err}")))
}

fn map_prediction_error(err: PredictionError) -> (StatusCode, ApiResponse) {
    let message = err.to_string();
    match err {
        PredictionError::Validation(ValidationError { field, reason }) => {
            let status = StatusCode::UNPROCESSABLE_ENTITY;
            let detail = serde_json::json!({ "field": field, "reason": reason });
            (status, ApiResponse::new(status, message, Some(detail)))
        }
        PredictionError::Downstream(_) => {
            let status = StatusCode::BAD_GATEWAY;
            (status, ApiResponse::new(status, message, None))
        }
        PredictionError::Persistence(_) => {
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            (status, ApiResponse::new(status, message, None))
        }
    }
}

fn reply(status: StatusCode, request_id: &str, body: ApiResponse) -> HttpReply {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    (status, headers, Json(body))
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(generate_request_id)
}

fn generate_request_id() -> String {
    let seq = REQUEST_ID_SEQ.fetch_add(1, Ordering::Relaxed);
    let ts_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0);
    format!("hpg-{ts_ms}-{seq}")
}
