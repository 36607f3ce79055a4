//! Database schema definitions.
//!
//! The DDL is restricted to syntax shared by SQLite and PostgreSQL so the
//! same statements run on either backend.

use sqlx::AnyConnection;

use crate::storage::StoreError;

/// Table holding persisted readings.
pub const READINGS_TABLE: &str = "weather_readings";

/// SQL statement for creating the readings table.
///
/// The uniqueness constraint on the full 4-tuple backs the transactional
/// existence check against concurrent duplicate deliveries.
pub const READINGS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS weather_readings (
    timestamp   TEXT NOT NULL,
    temperature DOUBLE PRECISION NOT NULL,
    humidity    DOUBLE PRECISION NOT NULL,
    pressure    DOUBLE PRECISION NOT NULL,
    CONSTRAINT weather_readings_identity UNIQUE (timestamp, temperature, humidity, pressure)
)
"#;

/// Index for ordered range scans by timestamp.
pub const READINGS_TIMESTAMP_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_weather_readings_timestamp ON weather_readings (timestamp)
"#;

/// Initialize the database schema.
///
/// Creates the readings table and its index if they don't exist.
pub async fn init_schema(conn: &mut AnyConnection) -> Result<(), StoreError> {
    for ddl in [READINGS_TABLE_DDL, READINGS_TIMESTAMP_INDEX_DDL] {
        sqlx::query(ddl).execute(&mut *conn).await?;
    }
    Ok(())
}
