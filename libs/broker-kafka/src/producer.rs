use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rdkafka::producer::{FutureProducer, FutureRecord, Producer};

use bridge_api::{BrokerError, Delivery, MessagePublisher};

use crate::config::KafkaConfig;
use crate::tls::TlsCredentials;

/// Producer с подтверждением доставки (`acks=all`).
///
/// Один экземпляр разделяется всеми egress pipelines.
pub struct KafkaPublisher {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig, tls: Option<&TlsCredentials>) -> Result<Self, BrokerError> {
        let producer: FutureProducer = config
            .producer_config(tls)
            .create()
            .map_err(|e| BrokerError::config(format!("create producer: {e}")))?;
        tracing::info!(brokers = %config.bootstrap_servers(), "kafka producer created");
        Ok(Self {
            producer,
            send_timeout: config.send_timeout(),
        })
    }
}

impl MessagePublisher for KafkaPublisher {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<Delivery, BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            let record = FutureRecord::<(), [u8]>::to(topic).payload(payload);
            match self.producer.send(record, self.send_timeout).await {
                Ok((partition, offset)) => Ok(Delivery { partition, offset }),
                Err((e, _msg)) => Err(BrokerError::publish(format!("publish to '{topic}': {e}"))),
            }
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            let producer = self.producer.clone();
            let timeout = self.send_timeout;
            tokio::task::spawn_blocking(move || producer.flush(timeout))
                .await
                .map_err(|e| BrokerError::publish(format!("flush task: {e}")))?
                .map_err(|e| BrokerError::publish(format!("flush producer: {e}")))?;
            tracing::info!("kafka producer flushed");
            Ok(())
        })
    }
}
