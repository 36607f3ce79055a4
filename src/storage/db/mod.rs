//! Database connection layer for multi-backend support.
//!
//! Supports SQLite and PostgreSQL through sqlx's `Any` driver; the backend is
//! picked from the URL scheme at connect time.
//!
//! Connections are opened per operation and must be handed back to
//! [`close`] on every exit path.
//!
//! # Example
//!
//! ```ignore
//! let mut conn = db::connect("sqlite://data/weather.db?mode=rwc").await?;
//! let row: (i64,) = sqlx::query_as("SELECT 1").fetch_one(&mut conn).await?;
//! db::close(conn).await;
//! ```

mod connection;

pub use connection::{DEFAULT_CONNECT_TIMEOUT, close, connect, connect_with_timeout};
