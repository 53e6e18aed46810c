use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use bridge_api::{Delivery, MessagePublisher};
use bridge_metrics::{BridgeMetrics, TopicMetrics};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::PipelineError;
use crate::bridge::{Pipeline, PipelineKind};
use crate::config::ProducerTopicSpec;

/// Обычный файл, найденный в source директории за один tick.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Итог одного tick'а. `failed` = файлы, оставленные до следующего tick'а.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub discovered: usize,
    pub sent: usize,
    pub failed: usize,
}

// ═══════════════════════════════════════════════════════════════
//  Egress Watcher
// ═══════════════════════════════════════════════════════════════

/// Файлы → topic: каждый файл публикуется одним сообщением и удаляется
/// только после подтверждения брокером.
pub struct EgressWatcher {
    name: String,
    spec: ProducerTopicSpec,
    publisher: Arc<dyn MessagePublisher>,
    metrics: Arc<TopicMetrics>,
    interval: Duration,
}

impl EgressWatcher {
    pub fn new(
        spec: ProducerTopicSpec,
        publisher: Arc<dyn MessagePublisher>,
        metrics: &BridgeMetrics,
        default_interval: Duration,
    ) -> Result<Self, PipelineError> {
        let interval = spec.poll_interval(default_interval);
        if interval.is_zero() {
            return Err(PipelineError::Config(format!(
                "producer [{}]: poll interval must be > 0",
                spec.topic
            )));
        }
        Ok(Self {
            name: format!("egress:{}", spec.topic),
            metrics: metrics.topic(&spec.topic),
            spec,
            publisher,
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Список обычных файлов source директории (symlink'и разыменовываются,
    /// поддиректории пропускаются).
    pub async fn discover(&self) -> Result<Vec<DiscoveredFile>, PipelineError> {
        let dir = &self.spec.source_path;
        let mut entries = tokio::fs::read_dir(dir).await.map_err(PipelineError::io(dir))?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(PipelineError::io(dir))? {
            let path = entry.path();
            let meta = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta,
                Err(e) => {
                    // файл исчез между read_dir и stat, или битый symlink
                    tracing::debug!(path = %path.display(), error = %e, "skipping entry");
                    continue;
                }
            };
            if !meta.is_file() {
                continue;
            }
            files.push(DiscoveredFile {
                path,
                size: meta.len(),
                modified: meta.modified().ok(),
            });
        }

        Ok(files)
    }

    /// Один проход по source директории.
    ///
    /// Ошибка чтения директории пропускает tick целиком и считается
    /// в `kafka_failed_messages_total`. Отмена проверяется перед каждым
    /// файлом; начатый файл доводится до конца.
    pub async fn poll_tick(&self, token: &CancellationToken) -> TickReport {
        let files = match self.discover().await {
            Ok(files) => files,
            Err(e) => {
                self.metrics.inc_failed();
                tracing::error!(topic = %self.spec.topic, error = %e, "failed to read source directory");
                return TickReport::default();
            }
        };

        let mut report = TickReport {
            discovered: files.len(),
            ..Default::default()
        };

        for file in &files {
            if token.is_cancelled() {
                break;
            }
            match self.process_file(file).await {
                Ok(_) => report.sent += 1,
                Err(_) => report.failed += 1,
            }
        }

        report
    }

    /// Прочитать файл, опубликовать и удалить.
    ///
    /// При ошибке чтения или публикации файл остаётся на месте и будет
    /// прочитан заново на следующем tick'е.
    pub async fn process_file(&self, file: &DiscoveredFile) -> Result<Delivery, PipelineError> {
        let started = Instant::now();
        let topic = &self.spec.topic;

        let payload = match tokio::fs::read(&file.path).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(%topic, path = %file.path.display(), error = %e, "failed to read file");
                return Err(PipelineError::Io {
                    path: file.path.clone(),
                    source: e,
                });
            }
        };

        let delivery = match self.publisher.publish(topic, &payload).await {
            Ok(delivery) => delivery,
            Err(e) => {
                self.metrics.inc_failed();
                tracing::warn!(%topic, path = %file.path.display(), error = %e, "failed to publish file, will retry");
                return Err(e.into());
            }
        };

        self.metrics.inc_produced();
        self.metrics.observe_duration(started.elapsed());
        tracing::info!(
            %topic,
            path = %file.path.display(),
            bytes = payload.len(),
            partition = delivery.partition,
            offset = delivery.offset,
            "file published"
        );

        // сообщение уже доставлено: ошибку удаления не превращаем в повторную отправку
        if let Err(e) = tokio::fs::remove_file(&file.path).await {
            tracing::error!(
                %topic,
                path = %file.path.display(),
                error = %e,
                "file published but could not be deleted"
            );
        }

        Ok(delivery)
    }
}

impl Pipeline for EgressWatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PipelineKind {
        PipelineKind::Egress
    }

    fn run(self: Box<Self>, token: CancellationToken) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            tracing::info!(
                pipeline = %self.name,
                topic = %self.spec.topic,
                source = %self.spec.source_path.display(),
                interval_ms = self.interval.as_millis() as u64,
                "watching"
            );

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let report = self.poll_tick(&token).await;
                if report.discovered > 0 {
                    tracing::debug!(
                        topic = %self.spec.topic,
                        discovered = report.discovered,
                        sent = report.sent,
                        failed = report.failed,
                        "tick"
                    );
                }
            }
        })
    }
}
