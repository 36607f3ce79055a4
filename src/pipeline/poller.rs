//! Poll-publish loop.
//!
//! Each tick fetches one reading and publishes it. Failures on either side are
//! logged and the tick is skipped; nothing is retried or buffered, and the
//! next tick runs on schedule.

use std::time::Duration;

use strum_macros::{AsRefStr, Display};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::bus::ReadingPublisher;
use crate::source::ReadingSource;

/// What happened during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum TickOutcome {
    /// Reading fetched and acknowledged by the bus.
    Published,
    /// Source failed; publisher was not called.
    FetchFailed,
    /// Reading fetched but lost at the publish boundary.
    PublishFailed,
}

/// Run a single fetch-then-publish cycle.
pub async fn poll_once<S, P>(source: &S, publisher: &P) -> TickOutcome
where
    S: ReadingSource + ?Sized,
    P: ReadingPublisher + ?Sized,
{
    let reading = match source.fetch().await {
        Ok(reading) => reading,
        Err(e) => {
            tracing::warn!(source = %source.name(), error = %e, "Fetch failed, skipping tick");
            return TickOutcome::FetchFailed;
        }
    };

    match publisher.publish(&reading).await {
        Ok(()) => {
            tracing::info!(
                timestamp = %reading.timestamp_string(),
                temperature = reading.temperature(),
                humidity = reading.humidity(),
                pressure = reading.pressure(),
                "Reading published"
            );
            TickOutcome::Published
        }
        Err(e) => {
            // Lossy boundary: the reading is gone for this tick.
            tracing::warn!(
                timestamp = %reading.timestamp_string(),
                error = %e,
                "Publish failed, reading dropped"
            );
            TickOutcome::PublishFailed
        }
    }
}

/// Poll on a fixed interval until cancelled.
///
/// The first tick fires immediately. A late tick delays the schedule instead
/// of bursting. Cancellation is only observed between ticks, so a tick in
/// progress always completes; its duration is bounded by the fetch and publish
/// timeouts. Returns the number of ticks run.
pub async fn run<S, P>(
    source: &S,
    publisher: &P,
    interval: Duration,
    cancel: CancellationToken,
) -> u64
where
    S: ReadingSource + ?Sized,
    P: ReadingPublisher + ?Sized,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = 0u64;

    tracing::info!(
        source = %source.name(),
        interval_secs = interval.as_secs(),
        "Poller started"
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        ticks += 1;
        let outcome = poll_once(source, publisher).await;
        tracing::debug!(tick = ticks, outcome = %outcome, "Tick complete");
    }

    tracing::info!(ticks, "Poller stopped");
    ticks
}
