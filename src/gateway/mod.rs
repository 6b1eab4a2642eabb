//! Gateway 应用层
//!
//! HTTP 服务器和请求处理

mod handlers;
mod middleware;
mod state;

pub use state::AppState;

use anyhow::{Context, Result};
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::relay::Upstream;

/// 唯一的转发端点
pub const QUERY_PATH: &str = "/api/v1/troubleshooting/query/";

pub async fn serve(config: Config) -> Result<()> {
    let upstream = Upstream::from_config(&config)?;
    let state = AppState::new(upstream);
    let app = build_router(state);
    let addr = config.listen_addr();
    tracing::info!(target_url = %config.target_url, "Starting relay on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 构建路由
///
/// 这里不加请求级超时：等待后端的时间由 `Upstream::open` 限制，
/// 超时走 502 路径；已开始的事件流不受限制
pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route(QUERY_PATH, post(handlers::handle_query))
        .route("/health", get(handlers::handle_health))
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(middleware::request_logger))
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// 等待 Ctrl+C 或 SIGTERM
///
/// 收到信号后停止接受新连接，已开始的事件流会被等待到结束
async fn shutdown_signal() {
    let signal_name = tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => "ctrl-c",
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<&'static str>().await
            }
        },
        name = terminate() => name,
    };

    tracing::info!(signal = signal_name, "Shutting down, waiting for open streams");
}

#[cfg(unix)]
async fn terminate() -> &'static str {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    match unix_signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
            "SIGTERM"
        }
        Err(e) => {
            tracing::error!("Failed to listen for SIGTERM: {e}");
            std::future::pending().await
        }
    }
}

#[cfg(not(unix))]
async fn terminate() -> &'static str {
    std::future::pending().await
}
