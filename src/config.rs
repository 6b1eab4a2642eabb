//! 应用配置模块
//!
//! 负责从环境变量加载应用配置，包括：
//! - 服务器监听地址和端口
//! - 后端目标服务 URL
//! - 出站连接超时、等待响应头超时与 TLS 校验开关

use anyhow::{Context, Result};
use reqwest::Url;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_PORT: u16 = 5001;
const DEFAULT_TARGET_URL: &str = "http://localhost:8012/api/v1/troubleshooting/query/";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 300;

/// 应用配置
///
/// 启动时加载一次，之后不再修改
#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器监听地址（如 `0.0.0.0`、`127.0.0.1` 或 `::`）
    pub host: IpAddr,
    /// 服务器监听端口
    pub port: u16,
    /// 后端服务地址，所有请求都转发到这里
    pub target_url: Url,
    /// 出站连接超时
    pub connect_timeout: Duration,
    /// 等待后端响应头的超时，事件流开始后不再计时
    pub response_timeout: Duration,
    /// 是否禁用后端 TLS 证书校验（仅用于调试）
    pub disable_tls_verify: bool,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// # 环境变量
    ///
    /// - `RELAY_HOST`: 服务器监听 IP（默认: "0.0.0.0"）
    /// - `RELAY_PORT`: 服务器监听端口（默认: 5001）
    /// - `RELAY_TARGET_URL`: 后端服务 URL
    /// - `RELAY_CONNECT_TIMEOUT_SECS`: 出站连接超时秒数（默认: 10）
    /// - `RELAY_RESPONSE_TIMEOUT_SECS`: 等待后端响应头的秒数（默认: 300）
    /// - `RELAY_DISABLE_TLS_VERIFY`: 设为 `1` 或 `true` 时禁用证书校验
    ///
    /// # 错误
    ///
    /// - 如果 `RELAY_HOST` 不是 IP 地址
    /// - 如果 `RELAY_PORT` 不是有效的端口号
    /// - 如果 `RELAY_TARGET_URL` 不是 http(s) 绝对地址
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = match lookup("RELAY_HOST") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("RELAY_HOST must be an IP address, got {raw}"))?,
            None => DEFAULT_HOST,
        };

        let port = match lookup("RELAY_PORT") {
            Some(raw) => raw
                .parse()
                .context("RELAY_PORT must be a valid port number")?,
            None => DEFAULT_PORT,
        };

        let raw_target =
            lookup("RELAY_TARGET_URL").unwrap_or_else(|| DEFAULT_TARGET_URL.to_string());
        let target_url = Url::parse(&raw_target)
            .with_context(|| format!("RELAY_TARGET_URL is not a valid URL: {raw_target}"))?;
        if !matches!(target_url.scheme(), "http" | "https") {
            anyhow::bail!("RELAY_TARGET_URL must use http or https, got {raw_target}");
        }

        let connect_timeout =
            secs(&lookup, "RELAY_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?;
        let response_timeout =
            secs(&lookup, "RELAY_RESPONSE_TIMEOUT_SECS", DEFAULT_RESPONSE_TIMEOUT_SECS)?;

        let disable_tls_verify = lookup("RELAY_DISABLE_TLS_VERIFY")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            host,
            port,
            target_url,
            connect_timeout,
            response_timeout,
            disable_tls_verify,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    /// 本地服务的访问地址（供 `test` 命令使用）
    ///
    /// 监听通配地址时改用同协议族的回环地址
    pub fn local_query_url(&self) -> String {
        let host = match self.host {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        format!(
            "http://{}{}",
            SocketAddr::from((host, self.port)),
            crate::gateway::QUERY_PATH
        )
    }
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    let secs = match lookup(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} must be a whole number of seconds"))?,
        None => default,
    };
    Ok(Duration::from_secs(secs))
}
