//! sse-relay - 流式查询中继服务
//!
//! 接收浏览器发来的查询请求，原样转发给固定的后端服务，
//! 并把后端的流式响应重新封装为 Server-Sent Events 返回。
//!
//! # 功能特性
//!
//! - 单一转发端点，透传请求体和 `Authorization` 头
//! - 惰性流式转发，后端连接在任何退出路径上都会被释放
//! - 开放的 CORS 策略，便于浏览器直接调用
//!
//! # 命令行接口
//!
//! - `serve`: 启动中继服务器
//! - `test`: 向本地服务器发送测试查询

mod commands;
mod config;
mod gateway;
mod relay;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// sse-relay CLI
#[derive(Parser)]
#[command(name = "sse-relay")]
#[command(about = "Streaming query relay that re-frames backend output as SSE", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// 可用的命令
#[derive(Subcommand)]
enum Commands {
    /// 启动中继服务器
    Serve,
    /// 向本地服务器发送测试查询
    Test {
        /// 作为 Bearer token 转发给后端
        #[arg(short, long)]
        token: Option<String>,
        /// 查询内容
        #[arg(short, long, default_value = "hello")]
        query: String,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sse_relay=info,tower_http=info".into());

    let json = std::env::var("RELAY_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 加载 .env 文件（如果存在）
    if let Ok(dotenv_path) = std::env::var("RELAY_ENV_FILE") {
        dotenvy::from_path(&dotenv_path).ok();
    } else {
        dotenvy::dotenv().ok();
    }

    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve => commands::serve_command(config).await,
        Commands::Test { token, query } => commands::test_command(config, token, query).await,
    }
}
