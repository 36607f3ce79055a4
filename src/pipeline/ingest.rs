//! Ingest consumer: dedup, decode, persist.
//!
//! The [`Ingestor`] is the only reader of the delivery channel, so its dedup
//! slot needs no locking. Every failure is logged and the payload dropped;
//! processing continues with the next delivery.

use std::sync::Arc;

use strum_macros::{AsRefStr, Display};
use tokio::sync::mpsc;

use crate::bus::Deduplicator;
use crate::reading::Reading;
use crate::storage::{PersistOutcome, ReadingStore};

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum IngestOutcome {
    /// Byte-identical to the previous delivery.
    Duplicate,
    /// Could not be decoded into a reading.
    Malformed,
    /// New row committed.
    Inserted,
    /// Row already existed.
    AlreadyPresent,
    /// Store error; the reading was dropped.
    StoreFailed,
}

/// Per-outcome counters for one consumer run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub received: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub inserted: u64,
    pub already_present: u64,
    pub store_failed: u64,
}

impl IngestStats {
    fn record(&mut self, outcome: IngestOutcome) {
        self.received += 1;
        match outcome {
            IngestOutcome::Duplicate => self.duplicates += 1,
            IngestOutcome::Malformed => self.malformed += 1,
            IngestOutcome::Inserted => self.inserted += 1,
            IngestOutcome::AlreadyPresent => self.already_present += 1,
            IngestOutcome::StoreFailed => self.store_failed += 1,
        }
    }
}

pub struct Ingestor {
    dedup: Deduplicator,
    store: Arc<dyn ReadingStore>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self {
            dedup: Deduplicator::new(),
            store,
        }
    }

    /// Process one raw delivery.
    pub async fn handle(&mut self, payload: &[u8]) -> IngestOutcome {
        if !self.dedup.admit(payload) {
            tracing::debug!(bytes = payload.len(), "Duplicate delivery dropped");
            return IngestOutcome::Duplicate;
        }

        let reading = match Reading::from_payload(payload) {
            Ok(reading) => reading,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "Malformed payload dropped"
                );
                return IngestOutcome::Malformed;
            }
        };

        match self.store.persist(&reading).await {
            Ok(PersistOutcome::Inserted) => {
                tracing::info!(timestamp = %reading.timestamp_string(), "Reading stored");
                IngestOutcome::Inserted
            }
            Ok(PersistOutcome::AlreadyPresent) => IngestOutcome::AlreadyPresent,
            Err(e) => {
                tracing::error!(
                    timestamp = %reading.timestamp_string(),
                    error = %e,
                    "Persist failed, reading dropped"
                );
                IngestOutcome::StoreFailed
            }
        }
    }

    /// Consume deliveries until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Vec<u8>>) -> IngestStats {
        let mut stats = IngestStats::default();
        while let Some(payload) = rx.recv().await {
            let outcome = self.handle(&payload).await;
            stats.record(outcome);
        }
        tracing::info!(
            received = stats.received,
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            malformed = stats.malformed,
            store_failed = stats.store_failed,
            "Ingest consumer stopped"
        );
        stats
    }
}
