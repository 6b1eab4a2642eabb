//! SSE 帧封装
//!
//! 将后端的字节流按固定大小切块，每块封装为一个 `data: ...\n\n` 事件。
//! 帧是惰性生成的：只有当响应体被轮询时才会从后端读取下一块。

use bytes::{Bytes, BytesMut};
use futures::{stream, Stream, StreamExt};
use std::fmt::Display;

/// 每个 SSE 事件携带的最大字节数
pub const CHUNK_SIZE: usize = 1024;

const FRAME_PREFIX: &[u8] = b"data: ";
const FRAME_SUFFIX: &[u8] = b"\n\n";

/// 后端连接的持有者
///
/// 丢弃即释放连接；`Drop` 是唯一的释放点
struct UpstreamGuard<S> {
    inner: S,
}

impl<S> Drop for UpstreamGuard<S> {
    fn drop(&mut self) {
        tracing::debug!("upstream connection released");
    }
}

struct FrameState<S> {
    upstream: Option<UpstreamGuard<S>>,
    pending: Bytes,
    chunk_size: usize,
    chunks: u64,
    bytes: u64,
}

impl<S> FrameState<S> {
    fn close(&mut self, reason: &'static str) {
        if self.upstream.take().is_some() {
            tracing::info!(
                chunks = self.chunks,
                bytes = self.bytes,
                reason,
                "stream closed"
            );
        }
    }
}

/// 把单个块封装为 SSE 帧
///
/// 块必须是合法的 UTF-8
pub fn encode_frame(chunk: &[u8]) -> Result<Bytes, std::str::Utf8Error> {
    let text = std::str::from_utf8(chunk)?;
    let mut frame = BytesMut::with_capacity(FRAME_PREFIX.len() + text.len() + FRAME_SUFFIX.len());
    frame.extend_from_slice(FRAME_PREFIX);
    frame.extend_from_slice(text.as_bytes());
    frame.extend_from_slice(FRAME_SUFFIX);
    Ok(frame.freeze())
}

/// 将后端字节流转换为 SSE 帧流
///
/// # 行为
///
/// - 每个非空块（不超过 `chunk_size` 字节）产生一个帧，顺序与后端一致
/// - 后端读取出错或块不是合法 UTF-8 时，记录日志并静默结束，不发送错误帧
/// - 无论以何种方式结束（正常结束、出错、客户端断开导致流被丢弃），
///   后端连接都只释放一次
pub fn sse_frames<S, E>(
    upstream: S,
    chunk_size: usize,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display + Send + 'static,
{
    let state = FrameState {
        upstream: Some(UpstreamGuard { inner: upstream }),
        pending: Bytes::new(),
        chunk_size: chunk_size.max(1),
        chunks: 0,
        bytes: 0,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.pending.is_empty() {
                let Some(guard) = state.upstream.as_mut() else {
                    return None;
                };
                match guard.inner.next().await {
                    Some(Ok(bytes)) => {
                        state.pending = bytes;
                        continue;
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "An error occurred during streaming");
                        state.close("upstream error");
                        return None;
                    }
                    None => {
                        state.close("upstream exhausted");
                        return None;
                    }
                }
            }

            let take = state.pending.len().min(state.chunk_size);
            let chunk = state.pending.split_to(take);

            match encode_frame(&chunk) {
                Ok(frame) => {
                    state.chunks += 1;
                    state.bytes += chunk.len() as u64;
                    return Some((Ok::<_, std::io::Error>(frame), state));
                }
                Err(e) => {
                    tracing::error!(error = %e, "An error occurred during streaming");
                    state.close("invalid utf-8");
                    return None;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};

    /// 记录被丢弃次数的测试流
    struct Tracked<S> {
        inner: S,
        drops: Arc<AtomicUsize>,
    }

    impl<S: Stream + Unpin> Stream for Tracked<S> {
        type Item = S::Item;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Pin::new(&mut self.inner).poll_next(cx)
        }
    }

    impl<S> Drop for Tracked<S> {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    type Item = Result<Bytes, std::io::Error>;

    fn tracked(items: Vec<Item>) -> (Tracked<stream::Iter<std::vec::IntoIter<Item>>>, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        let upstream = Tracked {
            inner: stream::iter(items),
            drops: drops.clone(),
        };
        (upstream, drops)
    }

    fn ok(data: &'static [u8]) -> Item {
        Ok(Bytes::from_static(data))
    }

    async fn collect_frames<S>(frames: S) -> Vec<String>
    where
        S: Stream<Item = Item>,
    {
        frames
            .map(|frame| String::from_utf8(frame.unwrap().to_vec()).unwrap())
            .collect()
            .await
    }

    #[test]
    fn encode_frame_wraps_text() {
        assert_eq!(encode_frame(b"hello").unwrap(), Bytes::from_static(b"data: hello\n\n"));
        assert!(encode_frame(&[0xff, 0xfe]).is_err());
    }

    #[tokio::test]
    async fn emits_one_frame_per_chunk_in_order() {
        let (upstream, drops) = tracked(vec![ok(b"data1"), ok(b"data2")]);

        let frames = collect_frames(sse_frames(upstream, CHUNK_SIZE)).await;

        assert_eq!(frames, vec!["data: data1\n\n", "data: data2\n\n"]);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skips_empty_chunks() {
        let (upstream, _) = tracked(vec![ok(b""), ok(b"a"), ok(b""), ok(b"b")]);

        let frames = collect_frames(sse_frames(upstream, CHUNK_SIZE)).await;

        assert_eq!(frames, vec!["data: a\n\n", "data: b\n\n"]);
    }

    #[tokio::test]
    async fn splits_large_buffers_at_chunk_size() {
        let big = Bytes::from(vec![b'x'; CHUNK_SIZE * 2 + 10]);
        let (upstream, _) = tracked(vec![Ok(big)]);

        let frames = collect_frames(sse_frames(upstream, CHUNK_SIZE)).await;

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].len(), "data: ".len() + CHUNK_SIZE + 2);
        assert_eq!(frames[1].len(), "data: ".len() + CHUNK_SIZE + 2);
        assert_eq!(frames[2], format!("data: {}\n\n", "x".repeat(10)));
    }

    #[tokio::test]
    async fn invalid_utf8_truncates_and_releases_once() {
        let (upstream, drops) = tracked(vec![ok(b"first"), ok(&[0xc3, 0x28]), ok(b"never")]);

        let frames = collect_frames(sse_frames(upstream, CHUNK_SIZE)).await;

        assert_eq!(frames, vec!["data: first\n\n"]);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_error_truncates_and_releases_once() {
        let (upstream, drops) = tracked(vec![
            ok(b"first"),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            ok(b"never"),
        ]);

        let frames = collect_frames(sse_frames(upstream, CHUNK_SIZE)).await;

        assert_eq!(frames, vec!["data: first\n\n"]);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_consumer_releases_upstream() {
        let (upstream, drops) = tracked(vec![ok(b"one"), ok(b"two"), ok(b"three")]);

        let mut frames = Box::pin(sse_frames(upstream, CHUNK_SIZE));
        let first = frames.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"data: one\n\n"));
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(frames);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn upstream_is_not_read_before_first_poll() {
        let polled = Arc::new(AtomicUsize::new(0));
        let counter = polled.clone();
        let upstream = stream::iter(vec![ok(b"a")]).inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let frames = sse_frames(upstream, CHUNK_SIZE);
        assert_eq!(polled.load(Ordering::SeqCst), 0);

        let frames = collect_frames(frames).await;
        assert_eq!(frames, vec!["data: a\n\n"]);
        assert_eq!(polled.load(Ordering::SeqCst), 1);
    }
}
