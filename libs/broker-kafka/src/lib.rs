//! Адаптер брокера поверх rdkafka: consumer group, acknowledged producer
//! и загрузка TLS материала.

pub mod config;
pub mod tls;
mod consumer;
mod producer;

pub use config::KafkaConfig;
pub use consumer::KafkaConsumerGroup;
pub use producer::KafkaPublisher;
pub use tls::{TlsConfig, TlsCredentials, TlsError};

use rdkafka::consumer::{BaseConsumer, Consumer};

use bridge_api::BrokerError;

/// Проверить доступность брокера: запросить metadata кластера.
///
/// Возвращает число брокеров в metadata. Ошибка фатальна при старте.
pub async fn probe(config: &KafkaConfig, tls: Option<&TlsCredentials>) -> Result<usize, BrokerError> {
    let client_config = config.client_config(tls);
    let timeout = config.connect_timeout();
    let servers = config.bootstrap_servers();

    tokio::task::spawn_blocking(move || {
        let client: BaseConsumer = client_config
            .create()
            .map_err(|e| BrokerError::config(format!("create probe client: {e}")))?;
        let metadata = client
            .fetch_metadata(None, timeout)
            .map_err(|e| BrokerError::connection(format!("brokers '{servers}' unreachable: {e}")))?;
        Ok(metadata.brokers().len())
    })
    .await
    .map_err(|e| BrokerError::connection(format!("probe task: {e}")))?
}
