//! In-memory брокер для тестов pipelines.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bridge_api::{
    BrokerError, Claim, ClaimHandler, ConsumerGroup, ConsumerSession, Delivery, InboundMessage, MessagePublisher,
};

// ═══════════════════════════════════════════════════════════════
//  Consumer side
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct RecordingSession {
    pub marked: Mutex<Vec<(i32, i64)>>,
    pub failing: AtomicBool,
}

impl RecordingSession {
    pub fn marked(&self) -> Vec<(i32, i64)> {
        self.marked.lock().unwrap().clone()
    }
}

impl ConsumerSession for RecordingSession {
    fn mark_consumed(&self, msg: &InboundMessage) -> Result<(), BrokerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BrokerError::consume("offset store rejected"));
        }
        self.marked.lock().unwrap().push((msg.partition, msg.offset));
        Ok(())
    }
}

/// Claim из фиксированного списка. С `hang_after` после исчерпания
/// списка `next()` не завершается никогда.
pub struct VecClaim {
    topic: String,
    messages: VecDeque<InboundMessage>,
    hang_after: bool,
}

impl VecClaim {
    pub fn new(topic: &str, messages: Vec<InboundMessage>) -> Self {
        Self {
            topic: topic.to_string(),
            messages: messages.into(),
            hang_after: false,
        }
    }

    pub fn hanging(mut self) -> Self {
        self.hang_after = true;
        self
    }
}

impl Claim for VecClaim {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<InboundMessage>, BrokerError>> + Send + '_>> {
        Box::pin(async move {
            match self.messages.pop_front() {
                Some(msg) => Ok(Some(msg)),
                None if self.hang_after => std::future::pending().await,
                None => Ok(None),
            }
        })
    }
}

/// Группа, отдающая по одному batch'у на сессию. Когда batch'и
/// кончаются, сессия висит до отмены.
pub struct FakeGroup {
    topic: String,
    batches: Mutex<VecDeque<VecClaim>>,
    pub session: RecordingSession,
    pub sessions: AtomicUsize,
    pub closed: AtomicBool,
}

impl FakeGroup {
    pub fn new(topic: &str, batches: Vec<VecClaim>) -> Self {
        Self {
            topic: topic.to_string(),
            batches: Mutex::new(batches.into()),
            session: RecordingSession::default(),
            sessions: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }
}

impl ConsumerGroup for FakeGroup {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn consume<'a>(
        &'a self,
        handler: &'a mut dyn ClaimHandler,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            self.sessions.fetch_add(1, Ordering::SeqCst);
            let batch = self.batches.lock().unwrap().pop_front();
            let mut claim = batch.unwrap_or_else(|| VecClaim::new(&self.topic, Vec::new()).hanging());

            handler.setup(&self.session)?;
            let result = handler.consume_claim(&self.session, &mut claim).await;
            handler.cleanup(&self.session)?;
            result
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Producer side
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct FakePublisher {
    pub sent: Mutex<Vec<(String, Vec<u8>)>>,
    pub failing: AtomicBool,
    pub attempts: AtomicUsize,
    pub closed: AtomicBool,
}

impl FakePublisher {
    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl MessagePublisher for FakePublisher {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<Delivery, BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(BrokerError::publish("broker unavailable"));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((topic.to_string(), payload.to_vec()));
            Ok(Delivery {
                partition: 0,
                offset: sent.len() as i64 - 1,
            })
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}
