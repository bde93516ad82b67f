//! Concatenated and length-limited streams with bounded-concurrency prefetch
//! (spec §4.7, C7).

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::stream::ByteStream;

pub type SubStreamFuture = Pin<Box<dyn Future<Output = Result<Box<dyn ByteStream>>> + Send>>;

/// How long an abandoned sub-stream future may run before its result is
/// dropped unread (spec §4.7: "awaited (with per-future timeout) and their
/// results disposed").
const DISPOSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Iterates a fixed sequence of sub-stream futures with bounded parallelism
/// `k`: the first is awaited immediately (minimizing time-to-first-byte),
/// and up to `k − 1` more are kept in flight in a FIFO window (spec §4.7
/// "Concurrency windowing"). The full sequence is known up front here (every
/// segment/part list is resolved before a stream is opened), so unlike the
/// spec's "lazy sequence of futures" there is no unbounded discovery to
/// model — the window still bounds how many are polled concurrently.
pub struct WindowedStreams {
    pending: VecDeque<SubStreamFuture>,
    remaining: VecDeque<SubStreamFuture>,
}

impl WindowedStreams {
    pub fn new(futures: Vec<SubStreamFuture>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        let mut remaining: VecDeque<SubStreamFuture> = futures.into();
        let mut pending = VecDeque::new();
        for _ in 0..concurrency {
            match remaining.pop_front() {
                Some(f) => pending.push_back(f),
                None => break,
            }
        }
        Self { pending, remaining }
    }

    pub async fn next(&mut self) -> Option<Result<Box<dyn ByteStream>>> {
        let fut = self.pending.pop_front()?;
        let result = fut.await;
        if let Some(next_fut) = self.remaining.pop_front() {
            self.pending.push_back(next_fut);
        }
        Some(result)
    }

    /// Awaits and discards every still-pending future (spec §4.7: "Must
    /// dispose *all* queued-but-unopened sub-streams on close").
    pub async fn dispose(mut self) {
        while let Some(fut) = self.pending.pop_front() {
            let _ = tokio::time::timeout(DISPOSE_TIMEOUT, fut).await;
        }
        self.remaining.clear();
    }
}

/// Lazily-concatenated stream over a sequence of sub-streams (spec §4.7
/// "Concatenated stream"): reads the current sub-stream to EOF, then
/// advances. On drop without explicit closure, still-pending sub-streams are
/// drained on a spawned task so nothing prefetched leaks.
pub struct ConcatenatedStream {
    window: Option<WindowedStreams>,
    current: Option<Box<dyn ByteStream>>,
    total_len: u64,
    cancel: CancellationToken,
}

impl ConcatenatedStream {
    pub fn new(futures: Vec<SubStreamFuture>, concurrency: usize, total_len: u64, cancel: CancellationToken) -> Self {
        Self {
            window: Some(WindowedStreams::new(futures, concurrency)),
            current: None,
            total_len,
            cancel,
        }
    }

    /// Awaits and disposes every remaining sub-stream (spec §4.7). Prefer
    /// this over letting the value simply drop when the caller can await.
    pub async fn close(mut self) {
        if let Some(window) = self.window.take() {
            window.dispose().await;
        }
    }
}

#[async_trait]
impl ByteStream for ConcatenatedStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if let Some(stream) = self.current.as_mut() {
                let n = stream.read(buf).await?;
                if n > 0 {
                    return Ok(n);
                }
                self.current = None;
            }

            let Some(window) = self.window.as_mut() else {
                return Ok(0);
            };
            match window.next().await {
                Some(Ok(stream)) => self.current = Some(stream),
                Some(Err(e)) => {
                    // On failure, drain and dispose every other already-enqueued
                    // sub-stream before surfacing the error, so nothing is left
                    // running in the background past this call (spec's
                    // resolution for C7's windowed-concurrency failure case).
                    if let Some(window) = self.window.take() {
                        window.dispose().await;
                    }
                    return Err(e);
                }
                None => {
                    self.window = None;
                    return Ok(0);
                }
            }
        }
    }

    fn len(&self) -> u64 {
        self.total_len
    }
}

impl Drop for ConcatenatedStream {
    fn drop(&mut self) {
        if let Some(window) = self.window.take() {
            tokio::task::spawn(window.dispose());
        }
    }
}

/// Caps total bytes returned at `limit`; never seeks (spec §4.7
/// "Length-limited stream").
pub struct LengthLimitedStream {
    inner: Box<dyn ByteStream>,
    remaining: u64,
}

impl LengthLimitedStream {
    pub fn new(inner: Box<dyn ByteStream>, limit: u64) -> Self {
        Self { inner, remaining: limit }
    }
}

#[async_trait]
impl ByteStream for LengthLimitedStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let cap = (self.remaining as usize).min(buf.len());
        let n = self.inner.read(&mut buf[..cap]).await?;
        self.remaining -= n as u64;
        Ok(n)
    }

    fn len(&self) -> u64 {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    fn boxed(data: &[u8]) -> SubStreamFuture {
        let data = data.to_vec();
        Box::pin(async move { Ok(Box::new(MemoryStream::new(data)) as Box<dyn ByteStream>) })
    }

    #[tokio::test]
    async fn concatenates_in_order() {
        let futures = vec![boxed(b"abc"), boxed(b"de"), boxed(b"fghi")];
        let mut stream = ConcatenatedStream::new(futures, 2, 9, CancellationToken::new());
        let mut out = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"abcdefghi");
    }

    #[tokio::test]
    async fn length_limited_caps_output() {
        let inner = Box::new(MemoryStream::new(b"0123456789".to_vec()));
        let mut stream = LengthLimitedStream::new(inner, 4);
        let mut out = Vec::new();
        let mut buf = [0u8; 16];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"0123");
    }

    #[tokio::test]
    async fn cancelled_token_surfaces_error() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut stream = ConcatenatedStream::new(vec![boxed(b"x")], 1, 1, cancel);
        let mut buf = [0u8; 1];
        assert!(matches!(stream.read(&mut buf).await, Err(Error::Cancelled)));
    }
}
