//! MQTT connection options shared by publisher and subscriber.

use rumqttc::MqttOptions;

use crate::config::BrokerConfig;

/// Client id suffix for the per-publish connection.
pub const PUBLISHER_SUFFIX: &str = "pub";

/// Client id suffix for the persistent subscription.
pub const SUBSCRIBER_SUFFIX: &str = "sub";

/// Build connection options with credentials for one side of the bridge.
///
/// Publisher and subscriber get distinct client ids so the broker never
/// kicks one off when the other connects. Sessions are clean: nothing is
/// queued for the subscriber while it is disconnected.
pub fn mqtt_options(config: &BrokerConfig, suffix: &str) -> MqttOptions {
    let client_id = format!("{}-{}", config.client_id, suffix);
    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options
        .set_credentials(config.username.clone(), config.password.clone())
        .set_keep_alive(config.keep_alive)
        .set_clean_session(true);
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::sample_config;

    #[test]
    fn test_distinct_client_ids() {
        let config = sample_config();
        let publisher = mqtt_options(&config.broker, PUBLISHER_SUFFIX);
        let subscriber = mqtt_options(&config.broker, SUBSCRIBER_SUFFIX);

        assert_eq!(publisher.client_id(), "meteobridge-pub");
        assert_eq!(subscriber.client_id(), "meteobridge-sub");
        assert_eq!(
            publisher.broker_address(),
            ("127.0.0.1".to_string(), 1883)
        );
        assert_eq!(subscriber.keep_alive(), config.broker.keep_alive);
        assert!(subscriber.clean_session());
    }
}
