//! Bus Layer
//!
//! MQTT plumbing between the poller and the ingest side.
//!
//! # Architecture
//!
//! - [`ReadingPublisher`] / [`MqttPublisher`]: one connection per published reading
//! - [`Subscription`] / [`MqttSubscription`]: reconnecting topic subscription
//! - [`BusSubscriber`]: subscription loop with backoff and readiness signal
//! - [`Deduplicator`]: drops a payload identical to the one before it

mod dedup;
mod error;
mod options;
mod publisher;
mod subscriber;

pub use dedup::Deduplicator;
pub use error::{PublishError, SubscribeError};
pub use options::mqtt_options;
pub use publisher::{MqttPublisher, ReadingPublisher};
pub use subscriber::{BusEvent, BusSubscriber, MqttSubscription, Subscription};
