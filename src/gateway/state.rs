//! Gateway 应用状态

use std::sync::Arc;

use crate::relay::Upstream;

/// Gateway 应用状态
///
/// 启动时构建一次，请求之间只读共享
#[derive(Clone)]
pub struct AppState {
    upstream: Arc<Upstream>,
}

impl AppState {
    pub fn new(upstream: Upstream) -> Self {
        Self {
            upstream: Arc::new(upstream),
        }
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }
}
