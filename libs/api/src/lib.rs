mod error;

use std::future::Future;
use std::pin::Pin;

pub use error::{BrokerError, ErrorKind};

// ════════════════════════════════════════════════════════════════
//  Message Types
// ════════════════════════════════════════════════════════════════

/// Сообщение, полученное из partition'а topic'а.
///
/// Производится адаптером брокера; pipelines только читают его.
/// В пределах одного partition'а offset монотонно возрастает.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub value: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, value: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            value: value.into(),
        }
    }
}

/// Подтверждение публикации: куда брокер записал сообщение.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

// ════════════════════════════════════════════════════════════════
//  Producer side
// ════════════════════════════════════════════════════════════════

/// Синхронная (acknowledged) публикация в topic.
///
/// Future завершается только после подтверждения брокером
/// или окончательной ошибки доставки.
pub trait MessagePublisher: Send + Sync {
    /// Опубликовать одно сообщение с payload'ом `payload`.
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<Delivery, BrokerError>> + Send + 'a>>;

    /// Дождаться отправки буферизованных сообщений и освободить соединение.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;
}

// ════════════════════════════════════════════════════════════════
//  Consumer side
// ════════════════════════════════════════════════════════════════

/// Сессия consumer group, bookkeeping offset'ов.
pub trait ConsumerSession: Send + Sync {
    /// Отметить сообщение как обработанное (offset уйдёт в следующий commit).
    ///
    /// Не гарантирует, что данные сообщения уже записаны на диск.
    fn mark_consumed(&self, msg: &InboundMessage) -> Result<(), BrokerError>;
}

/// Claim, упорядоченная последовательность сообщений одного цикла обработки.
///
/// Внутри partition'а сообщения приходят в порядке неубывания offset'а.
pub trait Claim: Send {
    /// Topic, из которого пришёл claim.
    fn topic(&self) -> &str;

    /// Следующее сообщение. `Ok(None)` = claim исчерпан (rebalance,
    /// shutdown или конец batch'а).
    #[allow(clippy::type_complexity)]
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<InboundMessage>, BrokerError>> + Send + '_>>;
}

/// Обработчик сессии consumer group: три операции жизненного цикла.
///
/// Реализуется один раз на ingress pipeline и передаётся адаптеру
/// брокера в `ConsumerGroup::consume`.
pub trait ClaimHandler: Send {
    /// Вызывается в начале сессии, до первого claim'а.
    fn setup(&mut self, session: &dyn ConsumerSession) -> Result<(), BrokerError>;

    /// Обработать claim целиком. Должен вернуться только после того,
    /// как все принятые сообщения обработаны.
    fn consume_claim<'a>(
        &'a mut self,
        session: &'a dyn ConsumerSession,
        claim: &'a mut dyn Claim,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + 'a>>;

    /// Вызывается в конце сессии, после последнего claim'а.
    fn cleanup(&mut self, session: &dyn ConsumerSession) -> Result<(), BrokerError>;
}

/// Group-coordinated потребление topic'а.
pub trait ConsumerGroup: Send + Sync {
    /// Topic, на который подписана группа.
    fn topic(&self) -> &str;

    /// Провести одну сессию: `setup` → `consume_claim` → `cleanup`.
    ///
    /// Возвращается после окончания сессии; вызывающий крутит цикл.
    fn consume<'a>(
        &'a self,
        handler: &'a mut dyn ClaimHandler,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + 'a>>;

    /// Закоммитить отмеченные offset'ы и отписаться.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;
}
