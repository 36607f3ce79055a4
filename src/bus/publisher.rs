//! Publishing side of the bus.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::time::timeout;
use tracing::debug;

use super::error::PublishError;
use super::options::{PUBLISHER_SUFFIX, mqtt_options};
use crate::config::BrokerConfig;
use crate::reading::Reading;

/// Request channel size for the short-lived publish client.
const REQUEST_CAPACITY: usize = 10;

/// Upper bound on the DISCONNECT exchange after a publish was acknowledged.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Sink for fetched readings.
#[async_trait]
pub trait ReadingPublisher: Send + Sync + 'static {
    /// Publish one reading. Returns once the bus has acknowledged it.
    async fn publish(&self, reading: &Reading) -> Result<(), PublishError>;
}

/// Publishes each reading over a fresh MQTT connection at QoS 1.
///
/// Connect, publish and wait for the PUBACK under `connect_timeout`, then
/// disconnect on a separate short bound. Nothing is retained
/// between calls so a broker outage only costs the current tick.
pub struct MqttPublisher {
    options: MqttOptions,
    topic: String,
    timeout: Duration,
}

impl MqttPublisher {
    pub fn new(config: &BrokerConfig) -> Self {
        Self {
            options: mqtt_options(config, PUBLISHER_SUFFIX),
            topic: config.topic.clone(),
            timeout: config.connect_timeout,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Connect and publish, returning once the matching PUBACK arrives.
    async fn deliver(&self, payload: Vec<u8>) -> Result<(AsyncClient, EventLoop), PublishError> {
        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);
        client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload)
            .await?;

        let mut pkid = None;
        loop {
            match eventloop.poll().await? {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    debug!(code = ?ack.code, "Publisher connected");
                }
                Event::Outgoing(Outgoing::Publish(id)) => pkid = Some(id),
                Event::Incoming(Packet::PubAck(ack)) if Some(ack.pkid) == pkid => {
                    return Ok((client, eventloop));
                }
                _ => {}
            }
        }
    }
}

/// Best-effort DISCONNECT after an acknowledged publish.
async fn disconnect(client: AsyncClient, mut eventloop: EventLoop) {
    if let Err(e) = client.disconnect().await {
        debug!(error = %e, "Failed to queue disconnect");
        return;
    }
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
            Ok(_) => {}
        }
    }
}

impl std::fmt::Debug for MqttPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttPublisher")
            .field("broker", &self.options.broker_address())
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ReadingPublisher for MqttPublisher {
    async fn publish(&self, reading: &Reading) -> Result<(), PublishError> {
        let payload = reading.to_payload()?;
        let start = Instant::now();

        let (client, eventloop) = timeout(self.timeout, self.deliver(payload.into_bytes()))
            .await
            .map_err(|_| PublishError::Timeout(self.timeout))??;

        debug!(
            topic = %self.topic,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Publish acknowledged"
        );

        // Acked; a slow or failed disconnect does not undo the publish.
        if timeout(DISCONNECT_TIMEOUT, disconnect(client, eventloop))
            .await
            .is_err()
        {
            debug!("Publisher disconnect timed out");
        }
        Ok(())
    }
}
