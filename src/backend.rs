//! Downstream invocation of the model-serving backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::payload::InferencePayload;

const MAX_BACKEND_ERROR_BODY_BYTES: usize = 64 * 1024;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("backend http client error: {0}")]
    Client(reqwest::Error),
    #[error("failed to encode inference payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("backend request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("backend status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("backend response decode error: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("backend response has no prediction at outputs[0].data[0]")]
    MissingPrediction,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InferenceOutcome {
    pub prediction: f64,
    pub duration: Duration,
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn invoke(&self, payload: &InferencePayload) -> Result<InferenceOutcome, InferenceError>;
}

/// Forwards payloads to a tensor-serving endpoint with a single JSON POST.
#[derive(Clone, Debug)]
pub struct HttpInferenceBackend {
    url: String,
    client: reqwest::Client,
}

impl HttpInferenceBackend {
    pub fn new(url: impl Into<String>) -> Result<Self, InferenceError> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(InferenceError::Client)?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl InferenceBackend for HttpInferenceBackend {
    async fn invoke(&self, payload: &InferencePayload) -> Result<InferenceOutcome, InferenceError> {
        let body = serde_json::to_vec(payload).map_err(InferenceError::Encode)?;

        let started = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(InferenceError::Request)?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response, MAX_BACKEND_ERROR_BODY_BYTES).await;
            return Err(InferenceError::Status { status, body });
        }

        let bytes = response.bytes().await.map_err(InferenceError::Request)?;
        let duration = started.elapsed();

        let parsed: Value = serde_json::from_slice(&bytes).map_err(InferenceError::Decode)?;
        let prediction = extract_prediction(&parsed).ok_or(InferenceError::MissingPrediction)?;
        Ok(InferenceOutcome {
            prediction,
            duration,
        })
    }
}

/// Collects at most `max_bytes` of an error response for diagnostics.
async fn error_body(mut response: reqwest::Response, max_bytes: usize) -> String {
    let mut out = Vec::<u8>::new();
    let mut truncated = false;
    while let Ok(Some(chunk)) = response.chunk().await {
        let remaining = max_bytes.saturating_sub(out.len());
        if chunk.len() > remaining {
            out.extend_from_slice(&chunk[..remaining]);
            truncated = true;
            break;
        }
        out.extend_from_slice(&chunk);
    }
    let mut body = String::from_utf8_lossy(&out).into_owned();
    if truncated {
        body.push_str("...(truncated)");
    }
    body
}

/// Reads `outputs[0].data[0]`, falling back to the MLflow-style
/// `predictions[0][0]` / `predictions[0]` shapes.
pub fn extract_prediction(body: &Value) -> Option<f64> {
    if let Some(value) = body.pointer("/outputs/0/data/0") {
        return value.as_f64();
    }
    let first = body.pointer("/predictions/0")?;
    match first {
        Value::Array(items) => items.first().and_then(Value::as_f64),
        other => other.as_f64(),
    }
}
