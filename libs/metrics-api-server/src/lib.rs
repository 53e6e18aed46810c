use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use bridge_metrics::BridgeMetrics;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone)]
struct AppState {
    metrics: Arc<BridgeMetrics>,
}

/// Router с единственным pull-endpoint'ом `GET /metrics`.
pub fn router(metrics: Arc<BridgeMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(handle_metrics))
        .with_state(AppState { metrics })
}

/// Занять порт endpoint'а. Вызывается до старта pipelines: занятый
/// порт это ошибка старта.
pub async fn bind(port: u16) -> Result<TcpListener, String> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind metrics :{port}: {e}"))
}

/// HTTP сервер метрик на уже занятом порту. Завершается после отмены `shutdown`.
pub async fn serve(
    listener: TcpListener,
    metrics: Arc<BridgeMetrics>,
    shutdown: CancellationToken,
) -> Result<(), String> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "metrics endpoint listening");
    }

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| format!("axum serve: {e}"))?;

    Ok(())
}

// --- GET /metrics ---

async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], state.metrics.render())
}
