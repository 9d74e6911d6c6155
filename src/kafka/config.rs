//! Kafka configuration module

use envconfig::Envconfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kafka consumer settings
#[derive(Debug, Clone, Deserialize, Serialize, Envconfig)]
pub struct KafkaConfig {
    /// Kafka broker addresses (comma-separated)
    #[serde(default = "default_brokers")]
    #[envconfig(from = "BOOTSTRAP_SERVERS", default = "localhost:9092")]
    pub brokers: String,

    /// SASL username; SASL is only configured when this is set
    #[serde(default)]
    #[envconfig(from = "KAFKA_USERNAME")]
    pub username: Option<String>,

    /// SASL password
    #[serde(default, skip_serializing)]
    #[envconfig(from = "KAFKA_PASSWORD")]
    pub password: Option<String>,

    /// Security protocol used when credentials are present
    #[serde(default = "default_security_protocol")]
    #[envconfig(from = "KAFKA_SECURITY_PROTOCOL", default = "SASL_SSL")]
    pub security_protocol: String,

    /// SASL mechanism
    #[serde(default = "default_sasl_mechanism")]
    #[envconfig(from = "KAFKA_SASL_MECHANISM", default = "PLAIN")]
    pub sasl_mechanism: String,

    /// Consumer group ID
    #[serde(default = "default_group_id")]
    #[envconfig(from = "KAFKA_GROUP_ID", default = "kiosk-ingest")]
    pub group_id: String,

    /// Topic the kiosks publish to
    #[serde(default = "default_topic")]
    #[envconfig(from = "KAFKA_TOPIC", default = "lmnh")]
    pub topic: String,

    /// Where to start when the group has no committed offset
    #[serde(default = "default_auto_offset_reset")]
    #[envconfig(from = "KAFKA_AUTO_OFFSET_RESET", default = "earliest")]
    pub auto_offset_reset: String,

    /// Session timeout in milliseconds
    #[serde(default = "default_session_timeout")]
    #[envconfig(from = "KAFKA_SESSION_TIMEOUT_MS", default = "30000")]
    pub session_timeout_ms: u32,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            username: None,
            password: None,
            security_protocol: default_security_protocol(),
            sasl_mechanism: default_sasl_mechanism(),
            group_id: default_group_id(),
            topic: default_topic(),
            auto_offset_reset: default_auto_offset_reset(),
            session_timeout_ms: default_session_timeout(),
        }
    }
}

impl KafkaConfig {
    /// Get session timeout as Duration
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms as u64)
    }

    /// Whether SASL credentials were supplied
    pub fn uses_sasl(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Build rdkafka consumer configuration
    ///
    /// Offsets are always committed by the ingest loop, and partition EOF is
    /// reported so the loop can log it.
    pub fn build_consumer_config(&self) -> rdkafka::ClientConfig {
        let mut config = rdkafka::ClientConfig::new();

        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "true")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", self.session_timeout_ms.to_string());

        if let (true, Some(username)) = (self.uses_sasl(), self.username.as_deref()) {
            config
                .set("security.protocol", &self.security_protocol)
                .set("sasl.mechanisms", &self.sasl_mechanism)
                .set("sasl.username", username)
                .set("sasl.password", self.password.as_deref().unwrap_or_default());
        }

        config
    }
}

// Default value functions
fn default_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_security_protocol() -> String {
    "SASL_SSL".to_string()
}

fn default_sasl_mechanism() -> String {
    "PLAIN".to_string()
}

fn default_group_id() -> String {
    "kiosk-ingest".to_string()
}

fn default_topic() -> String {
    "lmnh".to_string()
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_session_timeout() -> u32 {
    30000 // 30 seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KafkaConfig::default();
        assert_eq!(config.brokers, "localhost:9092");
        assert_eq!(config.group_id, "kiosk-ingest");
        assert_eq!(config.topic, "lmnh");
        assert_eq!(config.auto_offset_reset, "earliest");
        assert_eq!(config.session_timeout(), Duration::from_secs(30));
        assert!(!config.uses_sasl());
    }

    #[test]
    fn test_consumer_config_without_credentials() {
        let client = KafkaConfig::default().build_consumer_config();

        assert_eq!(client.get("enable.auto.commit"), Some("false"));
        assert_eq!(client.get("enable.partition.eof"), Some("true"));
        assert_eq!(client.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(client.get("security.protocol"), None);
    }

    #[test]
    fn test_consumer_config_with_sasl() {
        let config = KafkaConfig {
            username: Some("kiosk".to_string()),
            password: Some("secret".to_string()),
            ..KafkaConfig::default()
        };
        let client = config.build_consumer_config();

        assert_eq!(client.get("security.protocol"), Some("SASL_SSL"));
        assert_eq!(client.get("sasl.mechanisms"), Some("PLAIN"));
        assert_eq!(client.get("sasl.username"), Some("kiosk"));
        assert_eq!(client.get("sasl.password"), Some("secret"));
    }

    // One test so the env mutations cannot interleave
    #[test]
    fn test_credentials_only_from_kafka_variables() {
        std::env::set_var("USERNAME", "alice");
        std::env::remove_var("KAFKA_USERNAME");
        std::env::remove_var("KAFKA_PASSWORD");

        let login_only = KafkaConfig::init_from_env().unwrap();
        assert!(login_only.username.is_none());
        assert!(!login_only.uses_sasl());
        assert_eq!(login_only.build_consumer_config().get("security.protocol"), None);

        std::env::set_var("KAFKA_USERNAME", "kiosk");
        std::env::set_var("KAFKA_PASSWORD", "secret");

        let with_credentials = KafkaConfig::init_from_env().unwrap();
        std::env::remove_var("USERNAME");
        std::env::remove_var("KAFKA_USERNAME");
        std::env::remove_var("KAFKA_PASSWORD");

        assert_eq!(with_credentials.username.as_deref(), Some("kiosk"));
        assert_eq!(with_credentials.password.as_deref(), Some("secret"));
        assert!(with_credentials.uses_sasl());
    }

    #[test]
    fn test_password_not_serialized() {
        let config = KafkaConfig {
            username: Some("kiosk".to_string()),
            password: Some("secret".to_string()),
            ..KafkaConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
