//! Troubleshooting 查询转发处理器

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Response, StatusCode},
    Json,
};
use serde_json::Value;

use crate::gateway::{handlers::bad_gateway, state::AppState};
use crate::relay::{sse_frames, CHUNK_SIZE};

/// POST /api/v1/troubleshooting/query/ 处理器
///
/// 请求体和 `Authorization` 原样转发给后端，后端的响应体以 SSE 帧的形式流式返回
pub async fn handle_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let authorization = headers.get(header::AUTHORIZATION).cloned();

    let upstream = match state.upstream().open(&body, authorization).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!("Error connecting to target server: {:#}", err);
            return bad_gateway(&err);
        }
    };

    tracing::info!(status = %upstream.status(), "relaying upstream stream");

    let frames = sse_frames(Box::pin(upstream.bytes_stream()), CHUNK_SIZE);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(frames))
        .unwrap_or_else(|e| bad_gateway(&anyhow::anyhow!("Failed to build streaming response: {}", e)))
}
