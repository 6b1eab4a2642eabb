//! HTTP 请求处理器

pub mod health;
pub mod query;

pub use health::handle_health;
pub use query::handle_query;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// 后端不可用时返回给调用方的 502 响应
fn bad_gateway(err: &anyhow::Error) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("Error: Could not connect to the backend service. {:#}", err),
    )
        .into_response()
}
