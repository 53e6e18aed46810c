use std::future::Future;
use std::sync::Arc;

use bridge_api::{ConsumerGroup, MessagePublisher};
use bridge_metrics::BridgeMetrics;
use broker_kafka::{KafkaConsumerGroup, KafkaPublisher, TlsCredentials};
use pipeline::{Bridge, EgressWatcher, IngressPipeline, Pipeline};
use tokio_util::sync::CancellationToken;

use crate::config::{ServeArgs, ServerConfig};
use crate::error::ServerError;

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("kafka-bridge starting");

    // --- Load config ---
    let config = ServerConfig::load(&args.config)?;
    config.validate()?;
    tracing::info!(
        config = %args.config,
        consumers = config.consumers.len(),
        producers = config.producers.len(),
        "loaded config"
    );

    // --- TLS + broker probe: всё фатально до старта pipelines ---
    let tls = TlsCredentials::load(&config.tls)?;
    if tls.is_some() {
        tracing::info!("tls enabled");
    }
    let brokers = broker_kafka::probe(&config.kafka, tls.as_ref()).await?;
    tracing::info!(brokers, servers = %config.kafka.bootstrap_servers(), "kafka reachable");

    for consumer in &config.consumers {
        pipeline::config::ensure_dir(&consumer.output_path)?;
    }
    for producer in &config.producers {
        pipeline::config::ensure_dir(&producer.source_path)?;
    }

    // --- Signals + metrics port: занимаются до старта pipelines ---
    let shutdown = shutdown_signal()?;
    let listener = metrics_api_server::bind(config.metrics_port)
        .await
        .map_err(ServerError::Metrics)?;

    let metrics = Arc::new(BridgeMetrics::new());

    // Все клиенты создаются до первого spawn: ошибка здесь не оставляет
    // запущенных pipelines без shutdown'а.
    let mut pipelines: Vec<Box<dyn Pipeline>> = Vec::new();

    // --- Ingress: topic → файлы ---
    for spec in &config.consumers {
        let group: Arc<dyn ConsumerGroup> = Arc::new(KafkaConsumerGroup::new(
            &config.kafka,
            tls.as_ref(),
            &spec.topic,
            &spec.group_id,
        )?);
        pipelines.push(Box::new(IngressPipeline::new(spec.clone(), group, &metrics)));
    }

    // --- Egress: файлы → topic (один producer на все pipelines) ---
    let publisher: Option<Arc<dyn MessagePublisher>> = if config.producers.is_empty() {
        None
    } else {
        Some(Arc::new(KafkaPublisher::new(&config.kafka, tls.as_ref())?))
    };
    if let Some(publisher) = &publisher {
        for spec in &config.producers {
            let watcher = EgressWatcher::new(spec.clone(), publisher.clone(), &metrics, config.poll_interval())?;
            pipelines.push(Box::new(watcher));
        }
    }

    let mut bridge = Bridge::new();
    for task in pipelines {
        bridge.spawn(task);
    }

    // --- Metrics endpoint ---
    let metrics_token = CancellationToken::new();
    let metrics_handle = tokio::spawn({
        let metrics = metrics.clone();
        let token = metrics_token.clone();
        async move {
            if let Err(e) = metrics_api_server::serve(listener, metrics, token).await {
                tracing::error!(error = %e, "metrics server error");
            }
        }
    });

    tracing::info!(pipelines = bridge.handles().len(), "bridge ready");

    // --- Ожидание Ctrl+C / SIGTERM ---
    shutdown.await;
    tracing::info!("shutting down...");

    // Pipelines доводят текущую работу до конца: flush буферов, текущий файл
    bridge.shutdown().await;

    if let Some(publisher) = &publisher {
        if let Err(e) = publisher.close().await {
            tracing::warn!(error = %e, "producer flush error");
        }
    }
    // endpoint живёт до конца shutdown'а pipelines
    metrics_token.cancel();
    if let Err(e) = metrics_handle.await {
        tracing::warn!(error = %e, "metrics task failed");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Установить обработчики Ctrl+C / SIGTERM. Future завершается по первому сигналу.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>, ServerError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            r = tokio::signal::ctrl_c() => {
                if let Err(e) = r {
                    tracing::error!(error = %e, "ctrl-c handler failed, shutting down");
                }
            }
            _ = term.recv() => {}
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>, ServerError> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl-c handler failed, shutting down");
        }
    })
}
