//! Bus error types.

use std::time::Duration;

use thiserror::Error;

/// Errors while publishing a reading. The reading is dropped for this tick.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Reading could not be serialized.
    #[error("failed to encode reading: {0}")]
    Encode(#[from] serde_json::Error),

    /// Broker unreachable, refused the connection, or dropped it mid-publish.
    #[error("bus connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    /// Request could not be queued on the client.
    #[error("bus client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// No acknowledgement within the connect timeout.
    #[error("publish not acknowledged within {0:?}")]
    Timeout(Duration),
}

/// Errors on the subscribing side. All of them lead to a backoff and retry.
#[derive(Debug, Error)]
pub enum SubscribeError {
    /// Connection lost or could not be established.
    #[error("bus connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    /// Subscribe request could not be queued.
    #[error("bus client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// Broker refused the subscription.
    #[error("subscription to '{0}' rejected by broker")]
    Rejected(String),
}
