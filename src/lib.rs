//! Meteobridge - Weather Telemetry Bridge
//!
//! Polls a weather source on a fixed interval, publishes each reading to an
//! MQTT topic, subscribes to that same topic, drops consecutive duplicate
//! deliveries and persists the rest idempotently into SQLite or PostgreSQL.
//!
//! # Architecture
//!
//! - **Source**: HTTP weather source with a hard per-call timeout
//! - **Bus**: MQTT publisher (QoS 1, one connection per reading) and a
//!   reconnecting subscriber with exponential backoff
//! - **Pipeline**: poll-publish loop and the single ingest consumer
//! - **Storage**: transactional existence-checked insert over sqlx
//! - **Supervisor**: task wiring and graceful shutdown
//!
//! Every failure after startup is logged and skipped. Only configuration
//! errors are fatal.
//!
//! # Example
//!
//! ```rust,no_run
//! use meteobridge::{AppConfig, Supervisor};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load("configs/config.yaml")?;
//!     config.validate()?;
//!     let supervisor = Supervisor::from_config(&config)?;
//!     supervisor.run(CancellationToken::new()).await;
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod bus;
pub mod config;
pub mod pipeline;
pub mod reading;
pub mod source;
pub mod storage;
pub mod supervisor;

pub use backoff::BackoffPolicy;
pub use bus::{
    BusEvent, BusSubscriber, Deduplicator, MqttPublisher, MqttSubscription, PublishError,
    ReadingPublisher, SubscribeError, Subscription,
};
pub use config::{AppConfig, ConfigError};
pub use pipeline::{IngestOutcome, IngestStats, Ingestor, TickOutcome, poll_once};
pub use reading::{DecodeError, Reading, ReadingError};
pub use source::{FetchError, OpenWeatherSource, ReadingSource};
pub use storage::{PersistOutcome, ReadingStore, SqlStore, StoreError};
pub use supervisor::{DEFAULT_SHUTDOWN_TIMEOUT, Supervisor};
