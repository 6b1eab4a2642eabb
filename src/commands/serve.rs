//! Serve 命令 - 启动中继服务器
//!
//! 此模块实现 `serve` 命令，启动 HTTP 服务器并把查询请求转发到后端服务。

use anyhow::Result;

use crate::config::Config;
use crate::gateway;

/// 执行服务器启动命令
///
/// # 参数
///
/// * `config` - 应用配置，包含监听地址、端口和后端地址
///
/// # 功能
///
/// - 构建出站 HTTP 客户端
/// - 初始化 HTTP 路由和中间件（含 CORS）
/// - 启动服务器并等待关闭信号
/// - 支持优雅关闭（Ctrl+C 或 SIGTERM）
pub async fn serve_command(config: Config) -> Result<()> {
    gateway::serve(config).await
}
