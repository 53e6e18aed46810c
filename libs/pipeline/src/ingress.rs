use std::collections::BTreeMap;
use std::future::Future;
use std::mem;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_api::{BrokerError, Claim, ClaimHandler, ConsumerGroup, ConsumerSession, InboundMessage};
use bridge_metrics::{BridgeMetrics, TopicMetrics};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::PipelineError;
use crate::bridge::{Pipeline, PipelineKind};
use crate::config::{AssemblyMode, ConsumerTopicSpec, FileNaming};

/// Пауза перед новой сессией после ошибки consumer group.
const SESSION_BACKOFF: Duration = Duration::from_secs(1);

// ═══════════════════════════════════════════════════════════════
//  Assembly Key
// ═══════════════════════════════════════════════════════════════

/// Ключ выходного файла в пределах одного цикла claim'а.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssemblyKey {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl AssemblyKey {
    pub fn file_name(&self, naming: FileNaming) -> String {
        match naming {
            FileNaming::TopicPartitionOffset => format!("{}-{}-{}", self.topic, self.partition, self.offset),
            FileNaming::PartitionOffset => format!("{}-{}", self.partition, self.offset),
        }
    }
}

struct PendingFile {
    buf: Vec<u8>,
    started: Instant,
}

/// Итог flush'а одного цикла.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub written: usize,
    pub failed: usize,
}

// ═══════════════════════════════════════════════════════════════
//  Ingress Assembler
// ═══════════════════════════════════════════════════════════════

/// Собирает сообщения claim'а в файлы `output_path`.
///
/// Буферы живут один цикл: от первого `on_message` до `on_claim_drained`.
pub struct IngressAssembler {
    spec: ConsumerTopicSpec,
    metrics: Arc<TopicMetrics>,
    pending: BTreeMap<AssemblyKey, PendingFile>,
    /// claim mode: partition → offset первого сообщения в текущем цикле
    heads: BTreeMap<i32, i64>,
}

impl IngressAssembler {
    pub fn new(spec: ConsumerTopicSpec, metrics: &BridgeMetrics) -> Self {
        let metrics = metrics.topic(&spec.topic);
        Self {
            spec,
            metrics,
            pending: BTreeMap::new(),
            heads: BTreeMap::new(),
        }
    }

    pub fn spec(&self) -> &ConsumerTopicSpec {
        &self.spec
    }

    /// Количество буферов, ожидающих flush.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn key_for(&mut self, msg: &InboundMessage) -> AssemblyKey {
        let offset = match self.spec.assembly {
            AssemblyMode::Message => msg.offset,
            AssemblyMode::Claim => *self.heads.entry(msg.partition).or_insert(msg.offset),
        };
        AssemblyKey {
            topic: msg.topic.clone(),
            partition: msg.partition,
            offset,
        }
    }

    /// Дописать payload в буфер ключа и отметить offset как обработанный.
    ///
    /// Отметка происходит до записи на диск: при падении процесса между
    /// отметкой и flush'ем данные буфера теряются.
    pub fn on_message(&mut self, session: &dyn ConsumerSession, msg: InboundMessage) -> AssemblyKey {
        let key = self.key_for(&msg);
        self.pending
            .entry(key.clone())
            .or_insert_with(|| PendingFile {
                buf: Vec::new(),
                started: Instant::now(),
            })
            .buf
            .extend_from_slice(&msg.value);

        if let Err(e) = session.mark_consumed(&msg) {
            tracing::warn!(
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                error = %e,
                "failed to mark message consumed"
            );
        }
        self.metrics.inc_consumed();
        key
    }

    /// Записать все буферы цикла на диск и очистить их.
    ///
    /// Ошибка записи одного файла не мешает остальным.
    pub async fn on_claim_drained(&mut self) -> FlushReport {
        self.heads.clear();
        let pending = mem::take(&mut self.pending);
        let mut report = FlushReport::default();

        for (key, file) in pending {
            let name = key.file_name(self.spec.naming);
            match write_checked(&self.spec.output_path, &name, &file.buf).await {
                Ok(path) => {
                    report.written += 1;
                    self.metrics.inc_written();
                    self.metrics.observe_duration(file.started.elapsed());
                    tracing::info!(
                        topic = %key.topic,
                        partition = key.partition,
                        offset = key.offset,
                        path = %path.display(),
                        bytes = file.buf.len(),
                        "file written"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    self.metrics.inc_failed();
                    tracing::error!(
                        topic = %key.topic,
                        partition = key.partition,
                        offset = key.offset,
                        file = %name,
                        error = %e,
                        "failed to write file, buffered data dropped"
                    );
                }
            }
        }

        report
    }
}

/// Запись через временный `.{name}.part`: write → sync → проверка длины → rename.
async fn write_checked(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf, PipelineError> {
    let target = dir.join(name);
    let tmp = dir.join(format!(".{name}.part"));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await.map_err(PipelineError::io(&tmp))?;
        file.write_all(data).await.map_err(PipelineError::io(&tmp))?;
        file.flush().await.map_err(PipelineError::io(&tmp))?;
        file.sync_all().await.map_err(PipelineError::io(&tmp))?;

        let actual = file.metadata().await.map_err(PipelineError::io(&tmp))?.len();
        drop(file);

        let expected = data.len() as u64;
        if actual != expected {
            return Err(PipelineError::SizeMismatch {
                path: tmp.clone(),
                expected,
                actual,
            });
        }

        tokio::fs::rename(&tmp, &target).await.map_err(PipelineError::io(&target))
    }
    .await;

    if let Err(e) = result {
        if let Err(rm) = tokio::fs::remove_file(&tmp).await {
            if rm.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %tmp.display(), error = %rm, "failed to remove temporary file");
            }
        }
        return Err(e);
    }
    Ok(target)
}

// ═══════════════════════════════════════════════════════════════
//  Claim Handler
// ═══════════════════════════════════════════════════════════════

/// Связка assembler'а с сессией consumer group.
struct IngressHandler {
    assembler: IngressAssembler,
    token: CancellationToken,
}

impl ClaimHandler for IngressHandler {
    fn setup(&mut self, _session: &dyn ConsumerSession) -> Result<(), BrokerError> {
        tracing::debug!(topic = %self.assembler.spec().topic, "session started");
        Ok(())
    }

    fn consume_claim<'a>(
        &'a mut self,
        session: &'a dyn ConsumerSession,
        claim: &'a mut dyn Claim,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + 'a>> {
        Box::pin(async move {
            let mut result = Ok(());
            loop {
                // после отмены новые сообщения не берём; уже принятые будут записаны ниже
                let next = tokio::select! {
                    biased;
                    _ = self.token.cancelled() => break,
                    next = claim.next() => next,
                };
                match next {
                    Ok(Some(msg)) => {
                        self.assembler.on_message(session, msg);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            }

            let report = self.assembler.on_claim_drained().await;
            if report.written + report.failed > 0 {
                tracing::debug!(
                    topic = %claim.topic(),
                    written = report.written,
                    failed = report.failed,
                    "claim flushed"
                );
            }
            result
        })
    }

    fn cleanup(&mut self, _session: &dyn ConsumerSession) -> Result<(), BrokerError> {
        tracing::debug!(topic = %self.assembler.spec().topic, "session finished");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Ingress Pipeline
// ═══════════════════════════════════════════════════════════════

/// topic → файлы: цикл сессий consumer group до отмены.
pub struct IngressPipeline {
    name: String,
    group: Arc<dyn ConsumerGroup>,
    assembler: IngressAssembler,
}

impl IngressPipeline {
    pub fn new(spec: ConsumerTopicSpec, group: Arc<dyn ConsumerGroup>, metrics: &BridgeMetrics) -> Self {
        Self {
            name: format!("ingress:{}", spec.topic),
            group,
            assembler: IngressAssembler::new(spec, metrics),
        }
    }
}

impl Pipeline for IngressPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PipelineKind {
        PipelineKind::Ingress
    }

    fn run(self: Box<Self>, token: CancellationToken) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let Self { name, group, assembler } = *self;
            let spec = assembler.spec().clone();
            tracing::info!(
                pipeline = %name,
                topic = %spec.topic,
                group_id = %spec.group_id,
                output = %spec.output_path.display(),
                "consuming"
            );

            let mut handler = IngressHandler {
                assembler,
                token: token.clone(),
            };

            while !token.is_cancelled() {
                if let Err(e) = group.consume(&mut handler).await {
                    tracing::error!(pipeline = %name, topic = %spec.topic, error = ?e, "consumer session failed");
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep(SESSION_BACKOFF) => {}
                    }
                }
            }

            if let Err(e) = group.close().await {
                tracing::warn!(pipeline = %name, topic = %spec.topic, error = %e, "failed to close consumer group");
            }
        })
    }
}
