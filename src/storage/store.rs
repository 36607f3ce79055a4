//! Reading persistence and read queries.
//!
//! Writes are idempotent: each [`SqlStore::persist`] call runs an existence
//! check on the full 4-tuple and the insert inside one transaction, so a
//! redelivered or replayed reading never produces a second row.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDateTime;
use sqlx::{Any, AnyConnection, Connection, Transaction};
use strum_macros::{AsRefStr, Display};

use crate::reading::{Reading, TIMESTAMP_FORMAT};
use crate::storage::StoreError;
use crate::storage::db;
use crate::storage::schema::init_schema;

// =============================================================================
// Types
// =============================================================================

/// Result of a successful persist call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PersistOutcome {
    /// A new row was written and committed.
    Inserted,
    /// An identical row already existed; nothing was written.
    AlreadyPresent,
}

/// Destination for decoded readings.
#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync + 'static {
    /// Persist a reading unless an identical row already exists.
    ///
    /// # Returns
    ///
    /// - `Ok(Inserted)` / `Ok(AlreadyPresent)`: the row exists exactly once
    /// - `Err(StoreError)`: the transaction was rolled back; nothing changed
    async fn persist(&self, reading: &Reading) -> Result<PersistOutcome, StoreError>;
}

// =============================================================================
// SQL Store
// =============================================================================

const COUNT_MATCHING_SQL: &str = r#"
    SELECT COUNT(*) FROM weather_readings
    WHERE timestamp = $1 AND temperature = $2 AND humidity = $3 AND pressure = $4
"#;

const INSERT_SQL: &str = r#"
    INSERT INTO weather_readings (timestamp, temperature, humidity, pressure)
    VALUES ($1, $2, $3, $4)
"#;

/// SQL-backed reading store (SQLite or PostgreSQL).
///
/// Holds only the connection URL: every operation opens its own connection
/// and closes it before returning, whatever the outcome.
pub struct SqlStore {
    url: String,
    schema_ready: AtomicBool,
}

impl std::fmt::Debug for SqlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlStore")
            .field("schema_ready", &self.schema_ready.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SqlStore {
    /// Create a store for the given connection URL. No connection is opened.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            schema_ready: AtomicBool::new(false),
        }
    }

    /// Create the readings table and index if missing.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        let mut conn = db::connect(&self.url).await?;
        let result = self.ensure_schema(&mut conn).await;
        db::close(conn).await;
        result
    }

    /// Readings with `start <= timestamp <= end`, oldest first.
    pub async fn range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Reading>, StoreError> {
        let mut conn = db::connect(&self.url).await?;
        let result = sqlx::query_as::<_, (String, f64, f64, f64)>(
            r#"
            SELECT timestamp, temperature, humidity, pressure FROM weather_readings
            WHERE timestamp >= $1 AND timestamp <= $2
            ORDER BY timestamp ASC
            "#,
        )
        .bind(start.format(TIMESTAMP_FORMAT).to_string())
        .bind(end.format(TIMESTAMP_FORMAT).to_string())
        .fetch_all(&mut conn)
        .await;
        db::close(conn).await;

        result?.into_iter().map(row_to_reading).collect()
    }

    /// The `limit` most recent readings, newest first.
    pub async fn latest(&self, limit: u32) -> Result<Vec<Reading>, StoreError> {
        let mut conn = db::connect(&self.url).await?;
        let result = sqlx::query_as::<_, (String, f64, f64, f64)>(
            r#"
            SELECT timestamp, temperature, humidity, pressure FROM weather_readings
            ORDER BY timestamp DESC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&mut conn)
        .await;
        db::close(conn).await;

        result?.into_iter().map(row_to_reading).collect()
    }

    /// Total number of stored readings.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let mut conn = db::connect(&self.url).await?;
        let result = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM weather_readings")
            .fetch_one(&mut conn)
            .await;
        db::close(conn).await;
        Ok(result?)
    }

    // --- Private helpers ---

    async fn ensure_schema(&self, conn: &mut AnyConnection) -> Result<(), StoreError> {
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        init_schema(conn).await?;
        self.schema_ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn persist_on(
        &self,
        conn: &mut AnyConnection,
        reading: &Reading,
    ) -> Result<PersistOutcome, StoreError> {
        self.ensure_schema(conn).await?;

        let mut tx = conn.begin().await?;
        match count_matching(&mut *tx, reading).await {
            Ok(0) => {}
            Ok(_) => {
                tx.commit().await?;
                return Ok(PersistOutcome::AlreadyPresent);
            }
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(e);
            }
        }
        insert_and_commit(tx, reading).await
    }
}

#[async_trait::async_trait]
impl ReadingStore for SqlStore {
    async fn persist(&self, reading: &Reading) -> Result<PersistOutcome, StoreError> {
        let mut conn = db::connect(&self.url).await?;
        let result = self.persist_on(&mut conn, reading).await;
        db::close(conn).await;

        if let Ok(PersistOutcome::AlreadyPresent) = result {
            tracing::info!(
                timestamp = %reading.timestamp_string(),
                "Reading already present, no insert"
            );
        }
        result
    }
}

async fn count_matching(conn: &mut AnyConnection, reading: &Reading) -> Result<i64, StoreError> {
    let existing: i64 = sqlx::query_scalar(COUNT_MATCHING_SQL)
        .bind(reading.timestamp_string())
        .bind(reading.temperature())
        .bind(reading.humidity())
        .bind(reading.pressure())
        .fetch_one(&mut *conn)
        .await?;
    Ok(existing)
}

/// Insert inside `tx` and commit. A unique violation means a concurrent
/// writer committed the same tuple after our count; that is rolled back and
/// reported as already present.
async fn insert_and_commit(
    mut tx: Transaction<'_, Any>,
    reading: &Reading,
) -> Result<PersistOutcome, StoreError> {
    let inserted = sqlx::query(INSERT_SQL)
        .bind(reading.timestamp_string())
        .bind(reading.temperature())
        .bind(reading.humidity())
        .bind(reading.pressure())
        .execute(&mut *tx)
        .await;

    match inserted {
        Ok(_) => {
            tx.commit().await?;
            Ok(PersistOutcome::Inserted)
        }
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            tx.rollback().await?;
            Ok(PersistOutcome::AlreadyPresent)
        }
        Err(e) => {
            rollback_quietly(tx).await;
            Err(e.into())
        }
    }
}

async fn rollback_quietly(tx: Transaction<'_, Any>) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "Rollback failed");
    }
}

fn row_to_reading(row: (String, f64, f64, f64)) -> Result<Reading, StoreError> {
    let (ts, temperature, humidity, pressure) = row;
    let timestamp = NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT)
        .map_err(|e| StoreError::InvalidData(format!("timestamp '{ts}': {e}")))?;
    Reading::new(timestamp, temperature, humidity, pressure)
        .map_err(|e| StoreError::InvalidData(e.to_string()))
}
