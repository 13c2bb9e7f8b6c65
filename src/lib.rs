//! House price prediction gateway.
//!
//! Validates housing records, forwards them to a tensor-serving model and
//! keeps an audit row for every prediction request.

pub mod backend;
pub mod config;
mod error;
pub mod http;
pub mod payload;
pub mod record;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod utils;

pub use backend::{HttpInferenceBackend, InferenceBackend, InferenceError, InferenceOutcome};
pub use config::{ConfigError, DatabaseTarget, ServiceConfig};
pub use error::{PredictionError, Result};
pub use http::{ApiResponse, GatewayHttpState, router};
pub use payload::{InferencePayload, TensorDatatype, TensorInput};
pub use record::{FurnishingStatus, HousingRecord, ValidationError, YesNo};
pub use service::{Clock, PRICE_UNIT, Prediction, PredictionService, SystemClock};
#[cfg(feature = "store-postgres")]
pub use store::PostgresStore;
pub use store::{AuditStore, AuditStoreError, PredictionLogEntry, SqliteStore};
