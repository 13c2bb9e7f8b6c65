use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::OptionalExtension;
use time::OffsetDateTime;

use super::{AuditStore, AuditStoreError, PredictionLogEntry, format_timestamp};
use crate::record::HousingRecord;

const SELECT_COLUMNS: &str = "id, mainroad, guestroom, basement, hotwaterheating, airconditioning,
     prefarea, furnishingstatus, area, bedrooms, bathrooms, stories, parking,
     prediction_response, timestamp, inference_time";

#[derive(Clone, Debug)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn init(&self) -> Result<(), AuditStoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), AuditStoreError> {
            let conn = open_connection(path)?;
            init_schema(&conn)?;
            Ok(())
        })
        .await?
    }

    pub async fn get_prediction_log(
        &self,
        id: i64,
    ) -> Result<Option<PredictionLogEntry>, AuditStoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<PredictionLogEntry>, AuditStoreError> {
            let conn = open_connection(path)?;
            init_schema(&conn)?;
            let entry = conn
                .query_row(
                    &format!("SELECT {SELECT_COLUMNS} FROM prediction_logs WHERE id = ?1"),
                    rusqlite::params![id],
                    read_entry,
                )
                .optional()?;
            Ok(entry)
        })
        .await?
    }

    /// Most recent rows first.
    pub async fn list_prediction_logs(
        &self,
        limit: usize,
    ) -> Result<Vec<PredictionLogEntry>, AuditStoreError> {
        let path = self.path.clone();
        let limit = i64::try_from(limit.max(1)).unwrap_or(i64::MAX);
        tokio::task::spawn_blocking(move || -> Result<Vec<PredictionLogEntry>, AuditStoreError> {
            let conn = open_connection(path)?;
            init_schema(&conn)?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM prediction_logs ORDER BY id DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(rusqlite::params![limit], read_entry)?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await?
    }
}

#[async_trait]
impl AuditStore for SqliteStore {
    async fn begin(
        &self,
        record: &HousingRecord,
        created_at: OffsetDateTime,
    ) -> Result<i64, AuditStoreError> {
        let path = self.path.clone();
        let record = record.clone();
        let timestamp = format_timestamp(created_at)?;

        tokio::task::spawn_blocking(move || -> Result<i64, AuditStoreError> {
            let conn = open_connection(path)?;
            init_schema(&conn)?;
            conn.execute(
                "INSERT INTO prediction_logs (
                    mainroad, guestroom, basement, hotwaterheating, airconditioning,
                    prefarea, furnishingstatus, area, bedrooms, bathrooms, stories,
                    parking, timestamp
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    record.mainroad.as_str(),
                    record.guestroom.as_str(),
                    record.basement.as_str(),
                    record.hotwaterheating.as_str(),
                    record.airconditioning.as_str(),
                    record.prefarea.as_str(),
                    record.furnishingstatus.as_str(),
                    record.area,
                    record.bedrooms,
                    record.bathrooms,
                    record.stories,
                    record.parking,
                    timestamp,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await?
    }

    async fn complete(
        &self,
        id: i64,
        prediction: f64,
        inference_time: Duration,
        completed_at: OffsetDateTime,
    ) -> Result<(), AuditStoreError> {
        let path = self.path.clone();
        let timestamp = format_timestamp(completed_at)?;
        let seconds = inference_time.as_secs_f64();

        tokio::task::spawn_blocking(move || -> Result<(), AuditStoreError> {
            let conn = open_connection(path)?;
            init_schema(&conn)?;
            let updated = conn.execute(
                "UPDATE prediction_logs
                 SET prediction_response = ?2,
                     inference_time = ?3,
                     timestamp = ?4
                 WHERE id = ?1",
                rusqlite::params![id, prediction, seconds, timestamp],
            )?;
            if updated == 0 {
                return Err(AuditStoreError::MissingEntry { id });
            }
            Ok(())
        })
        .await?
    }
}

fn read_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<PredictionLogEntry> {
    Ok(PredictionLogEntry {
        id: row.get(0)?,
        mainroad: row.get(1)?,
        guestroom: row.get(2)?,
        basement: row.get(3)?,
        hotwaterheating: row.get(4)?,
        airconditioning: row.get(5)?,
        prefarea: row.get(6)?,
        furnishingstatus: row.get(7)?,
        area: row.get(8)?,
        bedrooms: row.get(9)?,
        bathrooms: row.get(10)?,
        stories: row.get(11)?,
        parking: row.get(12)?,
        prediction_response: row.get(13)?,
        timestamp: row.get(14)?,
        inference_time: row.get(15)?,
    })
}

fn init_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS prediction_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            mainroad TEXT NOT NULL,
            guestroom TEXT NOT NULL,
            basement TEXT NOT NULL,
            hotwaterheating TEXT NOT NULL,
            airconditioning TEXT NOT NULL,
            prefarea TEXT NOT NULL,
            furnishingstatus TEXT NOT NULL,
            area REAL NOT NULL,
            bedrooms INTEGER NOT NULL,
            bathrooms INTEGER NOT NULL,
            stories INTEGER NOT NULL,
            parking INTEGER NOT NULL,
            prediction_response REAL,
            timestamp TEXT NOT NULL,
            inference_time REAL
        );
        CREATE INDEX IF NOT EXISTS idx_prediction_logs_timestamp
            ON prediction_logs(timestamp);",
    )?;
    Ok(())
}

fn open_connection(path: PathBuf) -> Result<rusqlite::Connection, rusqlite::Error> {
    let conn = rusqlite::Connection::open(path)?;
    let _ = conn.busy_timeout(Duration::from_secs(5));
    let _ = conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
    Ok(conn)
}
