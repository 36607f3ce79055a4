//! Pipeline Layer
//!
//! The two halves of the bridge that the supervisor schedules:
//!
//! - [`poller`]: fetch a reading per tick and publish it
//! - [`ingest`]: consume deliveries, drop duplicates, persist the rest

pub mod ingest;
pub mod poller;

pub use ingest::{IngestOutcome, IngestStats, Ingestor};
pub use poller::{TickOutcome, poll_once};
