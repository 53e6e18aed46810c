use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

// ═══════════════════════════════════════════════════════════════
//  Pipeline
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    /// topic → файлы
    Ingress,
    /// файлы → topic
    Egress,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKind::Ingress => write!(f, "ingress"),
            PipelineKind::Egress => write!(f, "egress"),
        }
    }
}

/// Долгоживущая задача, привязанная к одному topic'у.
///
/// `run` обязан вернуться вскоре после отмены токена и довести
/// до конца уже начатую работу (flush буфера, текущий файл).
pub trait Pipeline: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> PipelineKind;

    fn run(self: Box<Self>, token: CancellationToken) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Handle запущенного pipeline'а.
pub struct PipelineHandle {
    pub name: String,
    pub kind: PipelineKind,
    handle: JoinHandle<()>,
}

impl PipelineHandle {
    /// Задача pipeline'а завершилась.
    pub fn done(&self) -> bool {
        self.handle.is_finished()
    }

    /// Дождаться выхода pipeline'а. `Err` если задача запаниковала.
    pub async fn wait(self) -> Result<(), JoinError> {
        self.handle.await
    }
}

// ═══════════════════════════════════════════════════════════════
//  Bridge
// ═══════════════════════════════════════════════════════════════

/// Координатор: общий токен отмены и барьер завершения для всех pipelines.
pub struct Bridge {
    token: CancellationToken,
    tracker: TaskTracker,
    handles: Vec<PipelineHandle>,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Bridge {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            handles: Vec::new(),
        }
    }

    /// Токен, который отменяется при shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn handles(&self) -> &[PipelineHandle] {
        &self.handles
    }

    /// Запустить pipeline в отдельной задаче.
    pub fn spawn(&mut self, pipeline: Box<dyn Pipeline>) {
        let name = pipeline.name().to_string();
        let kind = pipeline.kind();
        tracing::info!(pipeline = %name, %kind, "starting pipeline");

        let token = self.token.child_token();
        let log_name = name.clone();
        let handle = self.tracker.spawn(async move {
            pipeline.run(token).await;
            tracing::info!(pipeline = %log_name, %kind, "pipeline stopped");
        });

        self.handles.push(PipelineHandle { name, kind, handle });
    }

    /// Отменить все pipelines и дождаться, пока каждый вернётся.
    pub async fn shutdown(self) {
        tracing::info!(pipelines = self.handles.len(), "shutting down pipelines");
        self.token.cancel();
        self.tracker.close();

        for handle in self.handles {
            let (name, kind) = (handle.name.clone(), handle.kind);
            if let Err(e) = handle.wait().await {
                tracing::error!(pipeline = %name, %kind, error = %e, "pipeline task failed");
            }
        }
        self.tracker.wait().await;
        tracing::info!("all pipelines stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowPipeline {
        name: String,
        linger: Duration,
        finished: Arc<AtomicUsize>,
    }

    impl Pipeline for SlowPipeline {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> PipelineKind {
            PipelineKind::Egress
        }

        fn run(self: Box<Self>, token: CancellationToken) -> Pin<Box<dyn Future<Output = ()> + Send>> {
            Box::pin(async move {
                token.cancelled().await;
                // дочищаем "текущую работу" после отмены
                tokio::time::sleep(self.linger).await;
                self.finished.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_every_pipeline() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut bridge = Bridge::new();
        for (i, ms) in [5u64, 50, 120].into_iter().enumerate() {
            bridge.spawn(Box::new(SlowPipeline {
                name: format!("p{i}"),
                linger: Duration::from_millis(ms),
                finished: finished.clone(),
            }));
        }
        assert_eq!(bridge.handles().len(), 3);
        assert!(bridge.handles().iter().all(|h| !h.done()));

        bridge.shutdown().await;
        assert_eq!(finished.load(Ordering::SeqCst), 3);
    }

    struct PanickingPipeline;

    impl Pipeline for PanickingPipeline {
        fn name(&self) -> &str {
            "broken"
        }

        fn kind(&self) -> PipelineKind {
            PipelineKind::Ingress
        }

        fn run(self: Box<Self>, token: CancellationToken) -> Pin<Box<dyn Future<Output = ()> + Send>> {
            Box::pin(async move {
                token.cancelled().await;
                panic!("pipeline crashed on shutdown");
            })
        }
    }

    #[tokio::test]
    async fn test_handle_wait_resolves_after_exit() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut bridge = Bridge::new();
        bridge.spawn(Box::new(SlowPipeline {
            name: "p".into(),
            linger: Duration::from_millis(10),
            finished: finished.clone(),
        }));
        let token = bridge.token();
        let Bridge { handles, .. } = bridge;
        let handle = handles.into_iter().next().unwrap();
        assert_eq!(handle.name, "p");

        token.cancel();
        handle.wait().await.unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_survives_panicking_pipeline() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut bridge = Bridge::new();
        bridge.spawn(Box::new(PanickingPipeline));
        bridge.spawn(Box::new(SlowPipeline {
            name: "slow".into(),
            linger: Duration::from_millis(30),
            finished: finished.clone(),
        }));

        bridge.shutdown().await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_without_pipelines() {
        Bridge::new().shutdown().await;
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(PipelineKind::Ingress.to_string(), "ingress");
        assert_eq!(PipelineKind::Egress.to_string(), "egress");
    }
}
