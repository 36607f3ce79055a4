//! Storage Layer
//!
//! Durable, idempotent persistence of readings into `weather_readings`:
//! - **Writes**: existence-checked inserts, one transaction per reading
//! - **Reads**: ordered range scans for the visualization surface
//!
//! # Components
//!
//! - [`ReadingStore`]: Persistence seam used by the ingest consumer
//! - [`SqlStore`]: SQLite/PostgreSQL implementation via sqlx
//! - [`PersistOutcome`]: Inserted vs. already present
//! - [`StoreError`]: Connection, query and data errors

pub mod db;
mod error;
pub mod schema;
mod store;

pub use error::StoreError;
pub use store::{PersistOutcome, ReadingStore, SqlStore};
