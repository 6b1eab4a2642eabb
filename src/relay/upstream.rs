//! 出站连接
//!
//! 持有共享的 HTTP 客户端和后端地址，负责打开到后端的流式 POST 请求

use anyhow::{Context, Result};
use http::{header, HeaderMap, HeaderValue};
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;

use crate::config::Config;

const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(300);

/// 到固定后端的出站连接工厂
#[derive(Debug, Clone)]
pub struct Upstream {
    client: Client,
    target: Url,
    response_timeout: Duration,
}

impl Upstream {
    /// 根据配置构建客户端
    ///
    /// 客户端只设置连接超时，不设置整体超时，否则长时间运行的事件流会被截断。
    /// 等待响应头的时间由 `open` 单独限制
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut builder = Client::builder().connect_timeout(config.connect_timeout);

        if config.disable_tls_verify {
            tracing::warn!("TLS certificate verification is DISABLED - for debugging only!");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().context("Failed to create upstream HTTP client")?;
        Ok(Self::new(client, config.target_url.clone())
            .with_response_timeout(config.response_timeout))
    }

    pub fn new(client: Client, target: Url) -> Self {
        Self {
            client,
            target,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// 打开到后端的流式请求
    ///
    /// 响应体不会被提前读取。发送失败、等待响应头超时或后端返回 4xx/5xx 时返回错误，
    /// 此时已打开的响应随之被丢弃，连接随即释放
    pub async fn open(
        &self,
        body: &Value,
        authorization: Option<HeaderValue>,
    ) -> Result<reqwest::Response> {
        let headers = build_headers(authorization);

        tracing::info!(
            target_url = %self.target,
            authorized = headers.contains_key(header::AUTHORIZATION),
            "opening upstream stream"
        );

        let send = self
            .client
            .post(self.target.clone())
            .headers(headers)
            .json(body)
            .send();

        let response = tokio::time::timeout(self.response_timeout, send)
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Backend did not respond within {}s",
                    self.response_timeout.as_secs_f64()
                )
            })?
            .context("Failed to send request to backend")?;

        let status = response.status();
        tracing::debug!(%status, "upstream responded");

        response
            .error_for_status()
            .context("Backend returned an error status")
    }
}

fn build_headers(authorization: Option<HeaderValue>) -> HeaderMap {
    let mut map = HeaderMap::new();

    if let Some(value) = authorization {
        map.insert(header::AUTHORIZATION, value);
    }
    map.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    map.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));

    map
}
