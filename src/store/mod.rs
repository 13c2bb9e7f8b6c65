//! Audit persistence: one row per prediction request, inserted before the
//! downstream call and completed after it.

mod sqlite;
#[cfg(feature = "store-postgres")]
mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::record::HousingRecord;

pub use sqlite::SqliteStore;
#[cfg(feature = "store-postgres")]
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum AuditStoreError {
    #[error("sqlite join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[cfg(feature = "store-postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),
    #[error("timestamp error: {0}")]
    Timestamp(String),
    #[error("prediction log {id} not found")]
    MissingEntry { id: i64 },
}

/// A persisted audit row as read back from a store.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PredictionLogEntry {
    pub id: i64,
    pub mainroad: String,
    pub guestroom: String,
    pub basement: String,
    pub hotwaterheating: String,
    pub airconditioning: String,
    pub prefarea: String,
    pub furnishingstatus: String,
    pub area: f64,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub stories: i64,
    pub parking: i64,
    pub prediction_response: Option<f64>,
    /// RFC 3339, UTC.
    pub timestamp: String,
    /// Seconds.
    pub inference_time: Option<f64>,
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Inserts and commits a new row with no prediction yet. Returns its id.
    async fn begin(
        &self,
        record: &HousingRecord,
        created_at: OffsetDateTime,
    ) -> Result<i64, AuditStoreError>;

    /// Records the prediction and inference duration, overwriting the
    /// timestamp with `completed_at`.
    async fn complete(
        &self,
        id: i64,
        prediction: f64,
        inference_time: Duration,
        completed_at: OffsetDateTime,
    ) -> Result<(), AuditStoreError>;
}

pub(crate) fn format_timestamp(ts: OffsetDateTime) -> Result<String, AuditStoreError> {
    ts.to_offset(time::UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(|err| AuditStoreError::Timestamp(err.to_string()))
}
