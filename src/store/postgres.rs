use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use time::OffsetDateTime;

use super::{AuditStore, AuditStoreError, PredictionLogEntry, format_timestamp};
use crate::record::HousingRecord;

const MAX_CONNECTIONS: u32 = 8;

/// PostgreSQL audit store backed by a connection pool opened once at startup.
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(url: &str) -> Result<Self, AuditStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> Result<(), AuditStoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS prediction_logs (
                id BIGSERIAL PRIMARY KEY,
                mainroad TEXT NOT NULL,
                guestroom TEXT NOT NULL,
                basement TEXT NOT NULL,
                hotwaterheating TEXT NOT NULL,
                airconditioning TEXT NOT NULL,
                prefarea TEXT NOT NULL,
                furnishingstatus TEXT NOT NULL,
                area DOUBLE PRECISION NOT NULL,
                bedrooms BIGINT NOT NULL,
                bathrooms BIGINT NOT NULL,
                stories BIGINT NOT NULL,
                parking BIGINT NOT NULL,
                prediction_response DOUBLE PRECISION,
                timestamp TIMESTAMPTZ NOT NULL,
                inference_time DOUBLE PRECISION
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_prediction_log(
        &self,
        id: i64,
    ) -> Result<Option<PredictionLogEntry>, AuditStoreError> {
        let row = sqlx::query(
            "SELECT id, mainroad, guestroom, basement, hotwaterheating, airconditioning,
                    prefarea, furnishingstatus, area, bedrooms, bathrooms, stories, parking,
                    prediction_response, timestamp, inference_time
             FROM prediction_logs
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let timestamp: OffsetDateTime = row.try_get("timestamp")?;
        Ok(Some(PredictionLogEntry {
            id: row.try_get("id")?,
            mainroad: row.try_get("mainroad")?,
            guestroom: row.try_get("guestroom")?,
            basement: row.try_get("basement")?,
            hotwaterheating: row.try_get("hotwaterheating")?,
            airconditioning: row.try_get("airconditioning")?,
            prefarea: row.try_get("prefarea")?,
            furnishingstatus: row.try_get("furnishingstatus")?,
            area: row.try_get("area")?,
            bedrooms: row.try_get("bedrooms")?,
            bathrooms: row.try_get("bathrooms")?,
            stories: row.try_get("stories")?,
            parking: row.try_get("parking")?,
            prediction_response: row.try_get("prediction_response")?,
            timestamp: format_timestamp(timestamp)?,
            inference_time: row.try_get("inference_time")?,
        }))
    }
}

#[async_trait]
impl AuditStore for PostgresStore {
    async fn begin(
        &self,
        record: &HousingRecord,
        created_at: OffsetDateTime,
    ) -> Result<i64, AuditStoreError> {
        let row = sqlx::query(
            "INSERT INTO prediction_logs (
                mainroad, guestroom, basement, hotwaterheating, airconditioning,
                prefarea, furnishingstatus, area, bedrooms, bathrooms, stories,
                parking, timestamp
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING id",
        )
        .bind(record.mainroad.as_str())
        .bind(record.guestroom.as_str())
        .bind(record.basement.as_str())
        .bind(record.hotwaterheating.as_str())
        .bind(record.airconditioning.as_str())
        .bind(record.prefarea.as_str())
        .bind(record.furnishingstatus.as_str())
        .bind(record.area)
        .bind(record.bedrooms)
        .bind(record.bathrooms)
        .bind(record.stories)
        .bind(record.parking)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn complete(
        &self,
        id: i64,
        prediction: f64,
        inference_time: Duration,
        completed_at: OffsetDateTime,
    ) -> Result<(), AuditStoreError> {
        let result = sqlx::query(
            "UPDATE prediction_logs
             SET prediction_response = $2,
                 inference_time = $3,
                 timestamp = $4
             WHERE id = $1",
        )
        .bind(id)
        .bind(prediction)
        .bind(inference_time.as_secs_f64())
        .bind(completed_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AuditStoreError::MissingEntry { id });
        }
        Ok(())
    }
}
