//! 健康检查处理器

use axum::{extract::State, Json};
use serde::Serialize;

use crate::gateway::state::AppState;

/// 健康检查响应
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    target: String,
}

/// GET /health
///
/// 只报告自身存活，不探测后端
pub async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        target: state.upstream().target().to_string(),
    }))
}
