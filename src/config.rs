//! Configuration module for the bridge.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Weather source settings (endpoint, credentials, timeout)
//! - Broker settings (address, credentials, topic, reconnect bound)
//! - Database settings (connection URL)
//! - Pipeline settings (poll interval, channel capacity)
//!
//! Values may reference the environment with `${VAR}` or `${VAR:-default}`.
//! Everything is validated eagerly so missing credentials fail at startup.

mod app;
mod validation;

pub use app::{
    AppConfig, BrokerConfig, DatabaseConfig, DatabaseDriver, PipelineConfig, SourceConfig,
};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONNECT_TIMEOUT, DEFAULT_FETCH_INTERVAL,
    DEFAULT_FETCH_TIMEOUT, DEFAULT_RECONNECT_MAX, DEFAULT_TOPIC, MIN_FETCH_INTERVAL,
};

#[cfg(test)]
pub(crate) use app::tests::sample_config;
