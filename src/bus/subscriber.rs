//! Subscribing side of the bus.
//!
//! [`BusSubscriber`] drives a [`Subscription`] for the lifetime of the
//! process. It subscribes after every (re)connect, forwards raw payloads to
//! the ingest channel and backs off between failed connection attempts.
//! Payloads published while it is disconnected are not seen.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS, SubscribeReasonCode};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::SubscribeError;
use super::options::{SUBSCRIBER_SUFFIX, mqtt_options};
use crate::backoff::BackoffPolicy;
use crate::config::BrokerConfig;

/// Request channel size for the subscription client.
const REQUEST_CAPACITY: usize = 10;

/// What one poll of a subscription produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// Connection (re)established.
    Connected,
    /// Broker confirmed the subscription.
    Subscribed,
    /// Payload delivered on the subscribed topic.
    Message(Vec<u8>),
    /// Protocol traffic with nothing to act on.
    Idle,
}

/// A reconnecting subscription to one topic.
///
/// `next_event` reconnects on its own after an error; callers only decide
/// how long to wait before polling again.
#[async_trait]
pub trait Subscription: Send + 'static {
    /// Request the subscription on the current connection.
    async fn subscribe(&mut self) -> Result<(), SubscribeError>;

    /// Drive the connection until something happens.
    async fn next_event(&mut self) -> Result<BusEvent, SubscribeError>;
}

/// [`Subscription`] over a rumqttc event loop.
pub struct MqttSubscription {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
}

impl MqttSubscription {
    pub fn new(config: &BrokerConfig) -> Self {
        let (client, eventloop) =
            AsyncClient::new(mqtt_options(config, SUBSCRIBER_SUFFIX), REQUEST_CAPACITY);
        Self {
            client,
            eventloop,
            topic: config.topic.clone(),
        }
    }
}

#[async_trait]
impl Subscription for MqttSubscription {
    async fn subscribe(&mut self) -> Result<(), SubscribeError> {
        self.client
            .subscribe(self.topic.as_str(), QoS::AtLeastOnce)
            .await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Result<BusEvent, SubscribeError> {
        let event = self.eventloop.poll().await?;
        classify(event, &self.topic)
    }
}

/// Map one event-loop event onto what the subscriber cares about.
fn classify(event: Event, topic: &str) -> Result<BusEvent, SubscribeError> {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => Ok(BusEvent::Connected),
        Event::Incoming(Packet::SubAck(ack)) => {
            if ack
                .return_codes
                .iter()
                .any(|code| matches!(code, SubscribeReasonCode::Failure))
            {
                Err(SubscribeError::Rejected(topic.to_string()))
            } else {
                Ok(BusEvent::Subscribed)
            }
        }
        Event::Incoming(Packet::Publish(publish)) if publish.topic == topic => {
            Ok(BusEvent::Message(publish.payload.to_vec()))
        }
        _ => Ok(BusEvent::Idle),
    }
}

/// Long-running subscriber loop with reconnect backoff.
pub struct BusSubscriber<S> {
    subscription: S,
    backoff: BackoffPolicy,
    ready: watch::Sender<bool>,
}

impl<S: Subscription> BusSubscriber<S> {
    pub fn new(subscription: S, backoff: BackoffPolicy) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            subscription,
            backoff,
            ready,
        }
    }

    /// Flips to `true` once the broker has confirmed the subscription and
    /// back to `false` whenever the connection is lost.
    pub fn readiness(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    /// Run until cancelled or until the ingest side hangs up.
    pub async fn run(mut self, tx: mpsc::Sender<Vec<u8>>, cancel: CancellationToken) {
        let backoff = self.backoff;
        let mut attempt: u32 = 0;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.subscription.next_event() => event,
            };

            match event {
                Ok(BusEvent::Connected) => {
                    attempt = 0;
                    info!("Bus connected, subscribing");
                    if let Err(e) = self.subscription.subscribe().await {
                        warn!(error = %e, "Subscribe request failed");
                        if !pause(&backoff, &mut attempt, &cancel).await {
                            break;
                        }
                    }
                }
                Ok(BusEvent::Subscribed) => {
                    info!("Subscription confirmed");
                    self.ready.send_replace(true);
                }
                Ok(BusEvent::Message(payload)) => {
                    debug!(bytes = payload.len(), "Received payload");
                    let sent = tokio::select! {
                        _ = cancel.cancelled() => break,
                        sent = tx.send(payload) => sent,
                    };
                    if sent.is_err() {
                        info!("Ingest channel closed, stopping subscriber");
                        break;
                    }
                }
                Ok(BusEvent::Idle) => {}
                Err(SubscribeError::Rejected(topic)) => {
                    warn!(topic = %topic, "Subscription rejected, retrying");
                    if !pause(&backoff, &mut attempt, &cancel).await {
                        break;
                    }
                    if let Err(e) = self.subscription.subscribe().await {
                        warn!(error = %e, "Subscribe request failed");
                    }
                }
                Err(e) => {
                    self.ready.send_replace(false);
                    warn!(error = %e, attempt, "Bus connection lost");
                    if !pause(&backoff, &mut attempt, &cancel).await {
                        break;
                    }
                }
            }
        }

        self.ready.send_replace(false);
        info!("Subscriber stopped");
    }
}

/// Sleep for the next backoff step. Returns `false` if cancelled meanwhile.
async fn pause(backoff: &BackoffPolicy, attempt: &mut u32, cancel: &CancellationToken) -> bool {
    let delay = backoff.delay(*attempt);
    *attempt = attempt.saturating_add(1);
    debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnect");

    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    type Step = Result<BusEvent, SubscribeError>;

    /// Subscription fed by the test; pends while the feed is empty.
    struct FeedSubscription {
        feed: mpsc::UnboundedReceiver<Step>,
        subscribes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Subscription for FeedSubscription {
        async fn subscribe(&mut self) -> Result<(), SubscribeError> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn next_event(&mut self) -> Result<BusEvent, SubscribeError> {
            match self.feed.recv().await {
                Some(step) => step,
                None => std::future::pending().await,
            }
        }
    }

    fn feed(steps: Vec<Step>) -> (FeedSubscription, mpsc::UnboundedSender<Step>, Arc<AtomicUsize>) {
        let (tx, rx) = mpsc::unbounded_channel();
        for step in steps {
            tx.send(step).unwrap();
        }
        let subscribes = Arc::new(AtomicUsize::new(0));
        let subscription = FeedSubscription {
            feed: rx,
            subscribes: subscribes.clone(),
        };
        (subscription, tx, subscribes)
    }

    fn lost() -> Step {
        Err(SubscribeError::Connection(
            rumqttc::ConnectionError::NetworkTimeout,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribes_after_reconnect() {
        let (subscription, _feed, subscribes) = feed(vec![
            Ok(BusEvent::Connected),
            Ok(BusEvent::Subscribed),
            Ok(BusEvent::Message(b"A".to_vec())),
            lost(),
            lost(),
            Ok(BusEvent::Connected),
            Ok(BusEvent::Subscribed),
            Ok(BusEvent::Message(b"B".to_vec())),
        ]);
        let subscriber =
            BusSubscriber::new(subscription, BackoffPolicy::reconnect(Duration::from_secs(10)));
        let ready = subscriber.readiness();
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let handle = tokio::spawn(subscriber.run(tx, cancel.clone()));

        assert_eq!(rx.recv().await.unwrap(), b"A".to_vec());
        assert_eq!(rx.recv().await.unwrap(), b"B".to_vec());

        // Two failures: 1s then 2s.
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(subscribes.load(Ordering::SeqCst), 2);
        assert!(*ready.borrow());

        cancel.cancel();
        handle.await.unwrap();
        assert!(!*ready.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_capped_by_policy() {
        let mut steps: Vec<Step> = (0..6).map(|_| lost()).collect();
        steps.push(Ok(BusEvent::Connected));
        steps.push(Ok(BusEvent::Message(b"late".to_vec())));
        let (subscription, _feed, _) = feed(steps);
        let subscriber =
            BusSubscriber::new(subscription, BackoffPolicy::reconnect(Duration::from_secs(4)));
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let handle = tokio::spawn(subscriber.run(tx, cancel.clone()));

        assert_eq!(rx.recv().await.unwrap(), b"late".to_vec());
        // 1 + 2 + 4 + 4 + 4 + 4
        assert!(start.elapsed() >= Duration::from_secs(19));
        assert!(start.elapsed() < Duration::from_secs(20));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_follows_connection() {
        let (subscription, feed_tx, _) =
            feed(vec![Ok(BusEvent::Connected), Ok(BusEvent::Subscribed)]);
        let subscriber =
            BusSubscriber::new(subscription, BackoffPolicy::reconnect(Duration::from_secs(60)));
        let mut ready = subscriber.readiness();
        assert!(!*ready.borrow());
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(subscriber.run(tx, cancel.clone()));

        ready.wait_for(|r| *r).await.unwrap();
        feed_tx.send(lost()).unwrap();
        ready.wait_for(|r| !*r).await.unwrap();

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_subscription_retried() {
        let (subscription, _feed, subscribes) = feed(vec![
            Ok(BusEvent::Connected),
            Err(SubscribeError::Rejected("weather/munich".to_string())),
            Ok(BusEvent::Subscribed),
        ]);
        let subscriber =
            BusSubscriber::new(subscription, BackoffPolicy::reconnect(Duration::from_secs(60)));
        let mut ready = subscriber.readiness();
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(subscriber.run(tx, cancel.clone()));

        ready.wait_for(|r| *r).await.unwrap();
        assert_eq!(subscribes.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_ingest_closes() {
        let (subscription, _feed, _) = feed(vec![
            Ok(BusEvent::Connected),
            Ok(BusEvent::Message(b"A".to_vec())),
        ]);
        let subscriber =
            BusSubscriber::new(subscription, BackoffPolicy::reconnect(Duration::from_secs(1)));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        tokio::time::timeout(
            Duration::from_secs(5),
            subscriber.run(tx, CancellationToken::new()),
        )
        .await
        .expect("subscriber should stop once the channel is closed");
    }

    #[tokio::test]
    async fn test_cancel_while_idle() {
        let (subscription, _feed, _) = feed(vec![]);
        let subscriber =
            BusSubscriber::new(subscription, BackoffPolicy::reconnect(Duration::from_secs(1)));
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), subscriber.run(tx, cancel))
            .await
            .expect("cancelled subscriber should return");
    }

    /// Send but not Sync, like the rumqttc event loop.
    struct UnsyncSubscription {
        _marker: std::cell::Cell<u8>,
    }

    #[async_trait]
    impl Subscription for UnsyncSubscription {
        async fn subscribe(&mut self) -> Result<(), SubscribeError> {
            Ok(())
        }

        async fn next_event(&mut self) -> Result<BusEvent, SubscribeError> {
            std::future::pending().await
        }
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_run_future_is_send_for_unsync_subscription() {
        let subscription = UnsyncSubscription {
            _marker: std::cell::Cell::new(0),
        };
        let subscriber =
            BusSubscriber::new(subscription, BackoffPolicy::reconnect(Duration::from_secs(1)));
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let run = subscriber.run(tx, cancel);
        assert_send(&run);
        tokio::spawn(run).await.unwrap();
    }

    #[test]
    fn test_classify_connack_and_suback() {
        use rumqttc::{ConnAck, ConnectReturnCode, SubAck};

        let connack = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        )));
        assert_eq!(classify(connack, "weather/munich").unwrap(), BusEvent::Connected);

        let granted = Event::Incoming(Packet::SubAck(SubAck::new(
            1,
            vec![SubscribeReasonCode::Success(QoS::AtLeastOnce)],
        )));
        assert_eq!(classify(granted, "weather/munich").unwrap(), BusEvent::Subscribed);
    }

    #[test]
    fn test_classify_rejected_suback() {
        let rejected = Event::Incoming(Packet::SubAck(rumqttc::SubAck::new(
            1,
            vec![SubscribeReasonCode::Failure],
        )));
        match classify(rejected, "weather/munich") {
            Err(SubscribeError::Rejected(topic)) => assert_eq!(topic, "weather/munich"),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_filters_other_topics() {
        use rumqttc::Publish;

        let ours = Event::Incoming(Packet::Publish(Publish::new(
            "weather/munich",
            QoS::AtLeastOnce,
            b"reading".to_vec(),
        )));
        let other = Event::Incoming(Packet::Publish(Publish::new(
            "weather/berlin",
            QoS::AtLeastOnce,
            b"reading".to_vec(),
        )));

        assert_eq!(
            classify(ours, "weather/munich").unwrap(),
            BusEvent::Message(b"reading".to_vec())
        );
        assert_eq!(classify(other, "weather/munich").unwrap(), BusEvent::Idle);
        assert_eq!(
            classify(Event::Incoming(Packet::PingResp), "weather/munich").unwrap(),
            BusEvent::Idle
        );
    }
}
