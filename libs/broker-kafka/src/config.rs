use std::collections::BTreeMap;
use std::time::Duration;

use rdkafka::ClientConfig;
use serde::Deserialize;

use crate::tls::TlsCredentials;

/// Подключение к кластеру и параметры клиентов (`[kafka]` в конфиге).
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    /// Bootstrap брокеры, `host:port`.
    pub brokers: Vec<String>,
    /// Таймаут проверки доступности брокера при старте.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Максимум сообщений в одном claim'е.
    #[serde(default = "default_claim_max_messages")]
    pub claim_max_messages: usize,
    /// Claim завершается, если новых сообщений нет дольше этого времени.
    #[serde(default = "default_claim_linger_ms")]
    pub claim_linger_ms: u64,
    /// Таймаут доставки одного сообщения producer'ом.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// librdkafka properties, применяются последними (перекрывают defaults).
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_claim_max_messages() -> usize {
    1000
}
fn default_claim_linger_ms() -> u64 {
    1000
}
fn default_send_timeout_ms() -> u64 {
    30_000
}

impl KafkaConfig {
    pub fn new(brokers: Vec<String>) -> Self {
        Self {
            brokers,
            connect_timeout_ms: default_connect_timeout_ms(),
            claim_max_messages: default_claim_max_messages(),
            claim_linger_ms: default_claim_linger_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            properties: BTreeMap::new(),
        }
    }

    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn claim_linger(&self) -> Duration {
        Duration::from_millis(self.claim_linger_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err("kafka: 'brokers' must list at least one broker".into());
        }
        if self.claim_max_messages == 0 {
            return Err("kafka: 'claim_max_messages' must be > 0".into());
        }
        Ok(())
    }

    /// Базовая конфигурация клиента: брокеры + TLS + properties.
    pub fn client_config(&self, tls: Option<&TlsCredentials>) -> ClientConfig {
        let mut config = self.base(tls);
        self.apply_properties(&mut config);
        config
    }

    /// Consumer: offset'ы отмечаются явно и коммитятся auto-commit'ом.
    pub fn consumer_config(&self, tls: Option<&TlsCredentials>, group_id: &str) -> ClientConfig {
        let mut config = self.base(tls);
        config
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest");
        self.apply_properties(&mut config);
        config
    }

    /// Producer: подтверждение всеми ISR, до 5 повторов.
    pub fn producer_config(&self, tls: Option<&TlsCredentials>) -> ClientConfig {
        let mut config = self.base(tls);
        config
            .set("acks", "all")
            .set("message.send.max.retries", "5")
            .set("message.timeout.ms", self.send_timeout_ms.to_string());
        self.apply_properties(&mut config);
        config
    }

    fn base(&self, tls: Option<&TlsCredentials>) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", self.bootstrap_servers());
        if let Some(tls) = tls {
            tls.apply(&mut config);
        }
        config
    }

    fn apply_properties(&self, config: &mut ClientConfig) {
        for (key, value) in &self.properties {
            config.set(key, value);
        }
    }
}
