//! Request orchestration: validate, transform, audit, invoke, complete.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;

use crate::backend::InferenceBackend;
use crate::error::Result;
use crate::payload::InferencePayload;
use crate::record::HousingRecord;
use crate::store::AuditStore;

pub const PRICE_UNIT: &str = "GBP(£)";

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub log_id: i64,
    pub price: f64,
    pub unit: &'static str,
    pub inference_time: Duration,
}

#[derive(Clone)]
pub struct PredictionService {
    store: Arc<dyn AuditStore>,
    backend: Arc<dyn InferenceBackend>,
    clock: Arc<dyn Clock>,
}

impl PredictionService {
    pub fn new(store: Arc<dyn AuditStore>, backend: Arc<dyn InferenceBackend>) -> Self {
        Self::with_clock(store, backend, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn AuditStore>,
        backend: Arc<dyn InferenceBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            backend,
            clock,
        }
    }

    pub fn validate(&self, raw: &Value) -> Result<HousingRecord> {
        Ok(HousingRecord::from_json(raw)?)
    }

    /// Runs one prediction end to end.
    ///
    /// The audit row is committed before the backend is called, so a
    /// downstream failure leaves a row with a null prediction behind. A failed
    /// `complete` is reported as an error even though a prediction exists.
    pub async fn predict(&self, raw: &Value) -> Result<Prediction> {
        let record = self.validate(raw)?;
        let payload = InferencePayload::from_record(&record);

        let log_id = self
            .store
            .begin(&record, self.clock.now())
            .await
            .inspect_err(|err| tracing::error!(error = %err, "failed to insert prediction log"))?;
        tracing::info!(log_id, "prediction log opened");

        let outcome = self.backend.invoke(&payload).await.inspect_err(|err| {
            tracing::warn!(log_id, error = %err, "prediction backend call failed");
        })?;

        self.store
            .complete(log_id, outcome.prediction, outcome.duration, self.clock.now())
            .await
            .inspect_err(|err| {
                tracing::error!(log_id, error = %err, "failed to record prediction result");
            })?;

        tracing::info!(
            log_id,
            prediction = outcome.prediction,
            inference_time_ms = outcome.duration.as_millis() as u64,
            "prediction recorded"
        );

        Ok(Prediction {
            log_id,
            price: outcome.prediction,
            unit: PRICE_UNIT,
            inference_time: outcome.duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::backend::{InferenceError, InferenceOutcome};
    use crate::error::PredictionError;
    use crate::utils::test_support::sample_record_json as sample_json;
    use crate::store::AuditStoreError;

    #[derive(Clone, Debug)]
    struct Row {
        record: HousingRecord,
        prediction: Option<f64>,
        inference_time: Option<Duration>,
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<Row>>,
        fail_begin: bool,
        fail_complete: bool,
    }

    impl MemoryStore {
        fn rows(&self) -> Vec<Row> {
            self.rows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuditStore for MemoryStore {
        async fn begin(
            &self,
            record: &HousingRecord,
            _created_at: OffsetDateTime,
        ) -> std::result::Result<i64, AuditStoreError> {
            if self.fail_begin {
                return Err(AuditStoreError::Timestamp("store offline".to_string()));
            }
            let mut rows = self.rows.lock().unwrap();
            rows.push(Row {
                record: record.clone(),
                prediction: None,
                inference_time: None,
            });
            Ok(rows.len() as i64)
        }

        async fn complete(
            &self,
            id: i64,
            prediction: f64,
            inference_time: Duration,
            _completed_at: OffsetDateTime,
        ) -> std::result::Result<(), AuditStoreError> {
            if self.fail_complete {
                return Err(AuditStoreError::Timestamp("store offline".to_string()));
            }
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .get_mut((id - 1) as usize)
                .ok_or(AuditStoreError::MissingEntry { id })?;
            row.prediction = Some(prediction);
            row.inference_time = Some(inference_time);
            Ok(())
        }
    }

    struct StubBackend {
        prediction: Option<f64>,
        calls: AtomicUsize,
    }

    impl StubBackend {
        fn returning(prediction: f64) -> Self {
            Self {
                prediction: Some(prediction),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                prediction: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl InferenceBackend for StubBackend {
        async fn invoke(
            &self,
            payload: &InferencePayload,
        ) -> std::result::Result<InferenceOutcome, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(payload.inputs.len(), 12);
            match self.prediction {
                Some(prediction) => Ok(InferenceOutcome {
                    prediction,
                    duration: Duration::from_millis(12),
                }),
                None => Err(InferenceError::MissingPrediction),
            }
        }
    }

    fn service(store: &Arc<MemoryStore>, backend: &Arc<StubBackend>) -> PredictionService {
        PredictionService::new(store.clone(), backend.clone())
    }

    #[tokio::test]
    async fn successful_prediction_completes_the_audit_row() {
        let store = Arc::new(MemoryStore::default());
        let backend = Arc::new(StubBackend::returning(500_000.0));

        let prediction = service(&store, &backend)
            .predict(&sample_json())
            .await
            .expect("prediction");
        assert_eq!(prediction.price, 500_000.0);
        assert_eq!(prediction.unit, "GBP(£)");
        assert_eq!(prediction.inference_time, Duration::from_millis(12));
        assert_eq!(prediction.log_id, 1);

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].prediction, Some(500_000.0));
        assert_eq!(rows[0].inference_time, Some(Duration::from_millis(12)));
    }

    #[tokio::test]
    async fn invalid_input_never_touches_store_or_backend() {
        let store = Arc::new(MemoryStore::default());
        let backend = Arc::new(StubBackend::returning(1.0));
        let mut raw = sample_json();
        raw["furnishingstatus"] = serde_json::json!("luxury");

        let err = service(&store, &backend).predict(&raw).await.unwrap_err();
        assert!(matches!(err, PredictionError::Validation(_)));
        assert!(store.rows().is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn downstream_failure_leaves_row_without_prediction() {
        let store = Arc::new(MemoryStore::default());
        let backend = Arc::new(StubBackend::failing());

        let err = service(&store, &backend)
            .predict(&sample_json())
            .await
            .unwrap_err();
        assert!(matches!(err, PredictionError::Downstream(_)));
        assert!(err.to_string().contains("prediction service error"));

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].prediction, None);
        assert_eq!(rows[0].inference_time, None);
        assert_eq!(rows[0].record.bedrooms, 4);
    }

    #[tokio::test]
    async fn begin_failure_skips_the_backend_call() {
        let store = Arc::new(MemoryStore {
            fail_begin: true,
            ..MemoryStore::default()
        });
        let backend = Arc::new(StubBackend::returning(1.0));

        let err = service(&store, &backend)
            .predict(&sample_json())
            .await
            .unwrap_err();
        assert!(matches!(err, PredictionError::Persistence(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn complete_failure_is_reported_as_persistence_error() {
        let store = Arc::new(MemoryStore {
            fail_complete: true,
            ..MemoryStore::default()
        });
        let backend = Arc::new(StubBackend::returning(1.0));

        let err = service(&store, &backend)
            .predict(&sample_json())
            .await
            .unwrap_err();
        assert!(matches!(err, PredictionError::Persistence(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_predictions_create_independent_rows() {
        let store = Arc::new(MemoryStore::default());
        let backend = Arc::new(StubBackend::returning(500_000.0));
        let service = service(&store, &backend);

        let first = service.predict(&sample_json()).await.expect("first");
        let second = service.predict(&sample_json()).await.expect("second");
        assert_ne!(first.log_id, second.log_id);
        assert_eq!(store.rows().len(), 2);
    }
}
