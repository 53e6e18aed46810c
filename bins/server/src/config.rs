use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

pub use broker_kafka::{KafkaConfig, TlsConfig};
pub use pipeline::config::{ConsumerTopicSpec, ProducerTopicSpec};

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "kafka-bridge", about = "Мост между директориями и Kafka topic'ами")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить мост
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "config.toml", env = "CONFIG_PATH")]
    pub config: String,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    /// Порт HTTP endpoint'а `/metrics`.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Интервал опроса source директорий, если у producer'а не задан свой.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub consumers: Vec<ConsumerTopicSpec>,
    #[serde(default)]
    pub producers: Vec<ProducerTopicSpec>,
}

fn default_metrics_port() -> u16 {
    2112
}
fn default_poll_interval_ms() -> u64 {
    5000
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Проверки, которые нельзя выразить через serde.
    pub fn validate(&self) -> Result<(), ServerError> {
        let invalid = |detail: String| ServerError::Config { context: "validate", detail };

        if self.consumers.is_empty() && self.producers.is_empty() {
            return Err(ServerError::NoComponents("[[consumers]] or [[producers]]"));
        }
        self.kafka.validate().map_err(invalid)?;
        if self.poll_interval_ms == 0 {
            return Err(invalid("'poll_interval_ms' must be > 0".into()));
        }
        for consumer in &self.consumers {
            consumer.validate().map_err(invalid)?;
        }
        for producer in &self.producers {
            producer.validate().map_err(invalid)?;
        }
        pipeline::config::validate_layout(&self.consumers, &self.producers).map_err(invalid)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        metrics_port = 9100
        poll_interval_ms = 1000

        [kafka]
        brokers = ["kafka-1:9093", "kafka-2:9093"]
        claim_linger_ms = 250

        [kafka.properties]
        "client.id" = "bridge-a"

        [tls]
        enabled = true
        client_cert_file = "/etc/bridge/client.crt"
        client_key_file = "/etc/bridge/client.key"
        ca_cert_file = "/etc/bridge/ca.crt"

        [[consumers]]
        topic = "files.in"
        group_id = "bridge"
        output_path = "/data/in"
        assembly = "claim"

        [[producers]]
        topic = "files.out"
        source_path = "/data/out"
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = ServerConfig::parse(FULL).unwrap();
        assert_eq!(config.metrics_port, 9100);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.kafka.bootstrap_servers(), "kafka-1:9093,kafka-2:9093");
        assert_eq!(config.kafka.claim_linger_ms, 250);
        assert_eq!(config.kafka.properties["client.id"], "bridge-a");
        assert!(config.tls.enabled);
        assert_eq!(config.consumers.len(), 1);
        assert_eq!(config.producers.len(), 1);
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::parse(
            r#"
            [kafka]
            brokers = ["localhost:9092"]

            [[producers]]
            topic = "files.out"
            source_path = "/data/out"
            "#,
        )
        .unwrap();
        assert_eq!(config.metrics_port, 2112);
        assert_eq!(config.poll_interval_ms, 5000);
        assert!(!config.tls.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_no_pipelines_rejected() {
        let config = ServerConfig::parse("[kafka]\nbrokers = [\"localhost:9092\"]\n").unwrap();
        assert!(matches!(config.validate(), Err(ServerError::NoComponents(_))));
    }

    #[test]
    fn test_empty_brokers_rejected() {
        let config = ServerConfig::parse(
            r#"
            [kafka]
            brokers = []

            [[producers]]
            topic = "files.out"
            source_path = "/data/out"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ServerError::Config { context: "validate", .. })));
    }

    #[test]
    fn test_shared_directory_rejected() {
        let config = ServerConfig::parse(
            r#"
            [kafka]
            brokers = ["localhost:9092"]

            [[consumers]]
            topic = "files.in"
            group_id = "bridge"
            output_path = "/data/x"

            [[producers]]
            topic = "files.out"
            source_path = "/data/x"
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("already used"));
    }

    #[test]
    fn test_missing_kafka_section_is_parse_error() {
        assert!(ServerConfig::parse("metrics_port = 1\n").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = ServerConfig::load(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ServerError::Config { context: "read", .. }));
    }
}
