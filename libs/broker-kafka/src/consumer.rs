use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rdkafka::Message;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};

use bridge_api::{BrokerError, Claim, ClaimHandler, ConsumerGroup, ConsumerSession, InboundMessage};

use crate::config::KafkaConfig;
use crate::tls::TlsCredentials;

/// Consumer group поверх `StreamConsumer`, подписанный на один topic.
///
/// Claim это окно сообщений. Ждёт первое сообщение сколько угодно, затем
/// заканчивается после `claim_max_messages` сообщений или паузы дольше
/// `claim_linger_ms`. Offset'ы отмечаются явно (`store_offset`) и
/// коммитятся auto-commit'ом librdkafka.
pub struct KafkaConsumerGroup {
    consumer: StreamConsumer,
    topic: String,
    group_id: String,
    max_messages: usize,
    linger: Duration,
}

impl KafkaConsumerGroup {
    pub fn new(
        config: &KafkaConfig,
        tls: Option<&TlsCredentials>,
        topic: &str,
        group_id: &str,
    ) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = config
            .consumer_config(tls, group_id)
            .create()
            .map_err(|e| BrokerError::config(format!("create consumer ({topic}): {e}")))?;
        consumer
            .subscribe(&[topic])
            .map_err(|e| BrokerError::connection(format!("subscribe '{topic}': {e}")))?;

        tracing::info!(
            %topic,
            group_id = %group_id,
            brokers = %config.bootstrap_servers(),
            "kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            max_messages: config.claim_max_messages,
            linger: config.claim_linger(),
        })
    }
}

impl ConsumerGroup for KafkaConsumerGroup {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn consume<'a>(
        &'a self,
        handler: &'a mut dyn ClaimHandler,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            let session = KafkaSession { consumer: &self.consumer };
            handler.setup(&session)?;

            let mut claim = KafkaClaim {
                consumer: &self.consumer,
                topic: &self.topic,
                received: 0,
                max_messages: self.max_messages,
                linger: self.linger,
            };
            let result = handler.consume_claim(&session, &mut claim).await;
            let cleanup = handler.cleanup(&session);
            result.and(cleanup)
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            let committed = match self.consumer.commit_consumer_state(CommitMode::Sync) {
                Ok(()) => Ok(()),
                Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => Ok(()),
                Err(e) => Err(BrokerError::consume(format!(
                    "commit on close ({}, group {}): {e}",
                    self.topic, self.group_id
                ))),
            };
            self.consumer.unsubscribe();
            tracing::info!(topic = %self.topic, group_id = %self.group_id, "kafka consumer closed");
            committed
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Session / Claim
// ═══════════════════════════════════════════════════════════════

struct KafkaSession<'a> {
    consumer: &'a StreamConsumer,
}

impl ConsumerSession for KafkaSession<'_> {
    fn mark_consumed(&self, msg: &InboundMessage) -> Result<(), BrokerError> {
        // Хранится offset следующего сообщения.
        self.consumer
            .store_offset(&msg.topic, msg.partition, msg.offset + 1)
            .map_err(|e| {
                BrokerError::consume(format!(
                    "store offset {}/{}@{}: {e}",
                    msg.topic, msg.partition, msg.offset
                ))
            })
    }
}

struct KafkaClaim<'a> {
    consumer: &'a StreamConsumer,
    topic: &'a str,
    received: usize,
    max_messages: usize,
    linger: Duration,
}

impl Claim for KafkaClaim<'_> {
    fn topic(&self) -> &str {
        self.topic
    }

    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<InboundMessage>, BrokerError>> + Send + '_>> {
        Box::pin(async move {
            if self.received >= self.max_messages {
                return Ok(None);
            }

            let received = if self.received == 0 {
                self.consumer.recv().await
            } else {
                match tokio::time::timeout(self.linger, self.consumer.recv()).await {
                    Ok(r) => r,
                    Err(_) => return Ok(None),
                }
            };

            let msg = received
                .map_err(|e| BrokerError::consume(format!("receive from '{}': {e}", self.topic)))?;
            self.received += 1;

            Ok(Some(InboundMessage {
                topic: msg.topic().to_string(),
                partition: msg.partition(),
                offset: msg.offset(),
                value: msg.payload().unwrap_or_default().to_vec(),
            }))
        })
    }
}
