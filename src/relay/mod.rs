//! Relay 核心
//!
//! 把入站请求转发到固定的后端，并把后端的字节流重新封装为 SSE 事件

pub mod sse;
pub mod upstream;

pub use sse::{sse_frames, CHUNK_SIZE};
pub use upstream::Upstream;
