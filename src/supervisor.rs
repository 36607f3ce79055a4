//! Process lifecycle.
//!
//! The [`Supervisor`] wires the components from one [`AppConfig`] and runs
//! them until cancelled:
//!
//! ```text
//! poller ──publish──▶ broker ──▶ BusSubscriber ──mpsc──▶ Ingestor ──▶ store
//! ```
//!
//! The poll loop runs on the caller's task; the subscriber and the ingest
//! consumer get their own tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backoff::BackoffPolicy;
use crate::bus::{BusSubscriber, MqttPublisher, MqttSubscription, ReadingPublisher, Subscription};
use crate::config::AppConfig;
use crate::pipeline::{IngestStats, Ingestor, poller};
use crate::source::{FetchError, OpenWeatherSource, ReadingSource};
use crate::storage::{ReadingStore, SqlStore};

/// Upper bound on waiting for background tasks at shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns every pipeline component.
pub struct Supervisor<S = MqttSubscription> {
    source: Arc<dyn ReadingSource>,
    publisher: Arc<dyn ReadingPublisher>,
    subscription: S,
    store: Arc<SqlStore>,
    backoff: BackoffPolicy,
    fetch_interval: Duration,
    channel_capacity: usize,
    ready_timeout: Duration,
    shutdown_timeout: Duration,
}

impl Supervisor<MqttSubscription> {
    /// Build all components from a validated configuration.
    ///
    /// # Errors
    /// Fails only if the HTTP client for the source cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, FetchError> {
        let source = OpenWeatherSource::new(&config.source)?;
        let publisher = MqttPublisher::new(&config.broker);
        tracing::debug!(?source, ?publisher, "Pipeline components built");

        Ok(Self {
            source: Arc::new(source),
            publisher: Arc::new(publisher),
            subscription: MqttSubscription::new(&config.broker),
            store: Arc::new(SqlStore::new(config.database.url.clone())),
            backoff: BackoffPolicy::reconnect(config.reconnect_bound()),
            fetch_interval: config.pipeline.fetch_interval,
            channel_capacity: config.pipeline.channel_capacity,
            ready_timeout: config.broker.connect_timeout,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        })
    }
}

impl<S: Subscription> Supervisor<S> {
    /// Assemble a supervisor from explicit parts.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        source: Arc<dyn ReadingSource>,
        publisher: Arc<dyn ReadingPublisher>,
        subscription: S,
        store: Arc<SqlStore>,
        backoff: BackoffPolicy,
        fetch_interval: Duration,
        channel_capacity: usize,
        ready_timeout: Duration,
    ) -> Self {
        Self {
            source,
            publisher,
            subscription,
            store,
            backoff,
            fetch_interval,
            channel_capacity,
            ready_timeout,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Run the bridge until `cancel` fires.
    ///
    /// Nothing in here is fatal: schema setup failures are retried on the
    /// next persist and an unready subscriber only produces a warning.
    pub async fn run(self, cancel: CancellationToken) {
        let Self {
            source,
            publisher,
            subscription,
            store,
            backoff,
            fetch_interval,
            channel_capacity,
            ready_timeout,
            shutdown_timeout,
        } = self;

        if let Err(e) = store.init_schema().await {
            tracing::warn!(error = %e, "Schema initialization failed, will retry on first persist");
        }

        let (tx, rx) = mpsc::channel(channel_capacity);
        let ingest_store: Arc<dyn ReadingStore> = store;
        let consumer = tokio::spawn(Ingestor::new(ingest_store).run(rx));

        let subscriber = BusSubscriber::new(subscription, backoff);
        let mut ready = subscriber.readiness();
        let subscriber_cancel = cancel.child_token();
        let subscriber_task = tokio::spawn(subscriber.run(tx, subscriber_cancel.clone()));

        tokio::select! {
            _ = cancel.cancelled() => {}
            result = tokio::time::timeout(ready_timeout, ready.wait_for(|r| *r)) => {
                match result {
                    Ok(Ok(_)) => tracing::info!("Subscriber ready"),
                    _ => tracing::warn!(
                        timeout_ms = ready_timeout.as_millis() as u64,
                        "Subscriber not ready, starting poller anyway"
                    ),
                }
            }
        }

        poller::run(source.as_ref(), publisher.as_ref(), fetch_interval, cancel).await;

        tracing::info!("Shutting down pipeline");
        subscriber_cancel.cancel();
        shutdown(subscriber_task, consumer, shutdown_timeout).await;
    }
}

/// Wait for the subscriber to stop, then for the consumer to drain.
async fn shutdown(
    subscriber: JoinHandle<()>,
    consumer: JoinHandle<IngestStats>,
    timeout: Duration,
) {
    let drained = tokio::time::timeout(timeout, async {
        if let Err(e) = subscriber.await {
            tracing::error!(error = %e, "Subscriber task failed");
        }
        match consumer.await {
            Ok(stats) => tracing::info!(inserted = stats.inserted, "Ingest drained"),
            Err(e) => tracing::error!(error = %e, "Ingest task failed"),
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!(timeout_secs = timeout.as_secs(), "Pipeline shutdown timed out");
    } else {
        tracing::info!("Pipeline shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusEvent, SubscribeError};
    use crate::pipeline::poller::tests::{RecordingPublisher, ScriptedSource};
    use async_trait::async_trait;

    /// Connects and subscribes, then idles forever.
    struct IdleSubscription {
        steps: Vec<BusEvent>,
    }

    #[async_trait]
    impl Subscription for IdleSubscription {
        async fn subscribe(&mut self) -> Result<(), SubscribeError> {
            Ok(())
        }

        async fn next_event(&mut self) -> Result<BusEvent, SubscribeError> {
            match self.steps.pop() {
                Some(event) => Ok(event),
                None => std::future::pending().await,
            }
        }
    }

    fn supervisor(
        dir: &tempfile::TempDir,
        steps: Vec<BusEvent>,
        publisher: Arc<RecordingPublisher>,
    ) -> Supervisor<IdleSubscription> {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("sup.db").display());
        Supervisor::from_parts(
            Arc::new(ScriptedSource::new(vec![])),
            publisher,
            IdleSubscription { steps },
            Arc::new(SqlStore::new(url)),
            BackoffPolicy::reconnect(Duration::from_secs(1)),
            Duration::from_secs(60),
            8,
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn test_run_polls_after_subscriber_ready() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Arc::new(RecordingPublisher::default());
        // Popped from the back.
        let steps = vec![BusEvent::Subscribed, BusEvent::Connected];
        let sup = supervisor(&dir, steps, publisher.clone());

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sup.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("supervisor should stop")
            .unwrap();

        assert_eq!(publisher.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_proceeds_without_readiness() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Arc::new(RecordingPublisher::default());
        let sup = supervisor(&dir, vec![], publisher.clone());

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sup.run(cancel.clone()));

        // Ready timeout is 200ms; the first tick follows immediately.
        tokio::time::sleep(Duration::from_millis(600)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("supervisor should stop")
            .unwrap();

        assert_eq!(publisher.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_from_config_builds_components() {
        let config = crate::config::sample_config();
        let sup = Supervisor::from_config(&config).unwrap();
        assert_eq!(sup.fetch_interval, config.pipeline.fetch_interval);
        assert_eq!(sup.backoff.max, config.reconnect_bound());
        assert_eq!(sup.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
    }
}
