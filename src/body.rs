//! Size-limited view over a response body stream.

use std::fmt;
use std::future::Future;

use bytes::{Buf, Bytes, BytesMut};
use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// A source of body chunks that releases its resource when dropped.
pub trait BodyStream: Send {
    type Error;

    /// Returns the next chunk, or `None` at end of stream.
    fn next_chunk(
        &mut self,
    ) -> impl Future<Output = std::result::Result<Option<Bytes>, Self::Error>> + Send;
}

impl BodyStream for reqwest::Response {
    type Error = reqwest::Error;

    fn next_chunk(
        &mut self,
    ) -> impl Future<Output = std::result::Result<Option<Bytes>, Self::Error>> + Send {
        self.chunk()
    }
}

/// Response body that stops yielding data after a byte ceiling.
///
/// Once the ceiling is reached reads report end of stream even if the
/// underlying stream has more data; the rest is silently discarded. Errors
/// from the underlying stream are returned unchanged.
///
/// [`close`](Self::close) releases the underlying stream exactly once and is
/// safe to call repeatedly. Dropping the body releases it as well.
pub struct BoundedBody<S = reqwest::Response> {
    inner: Option<S>,
    remaining: u64,
    pending: Bytes,
}

impl<S> fmt::Debug for BoundedBody<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedBody")
            .field("remaining", &self.remaining)
            .field("pending", &self.pending.len())
            .field("closed", &self.inner.is_none())
            .finish()
    }
}

impl<S: BodyStream> BoundedBody<S> {
    /// Wraps `inner`, allowing at most `max_bytes` to be read.
    pub fn new(inner: S, max_bytes: u64) -> Self {
        Self {
            inner: Some(inner),
            remaining: max_bytes,
            pending: Bytes::new(),
        }
    }

    /// Bytes that may still be read before the ceiling is hit.
    pub fn remaining(&self) -> u64 {
        self.remaining + self.pending.len() as u64
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Returns the next chunk within the ceiling, or `None` at end of stream.
    pub async fn chunk(&mut self) -> std::result::Result<Option<Bytes>, S::Error> {
        if !self.pending.is_empty() {
            return Ok(Some(std::mem::take(&mut self.pending)));
        }
        self.next_bounded().await
    }

    /// Reads into `buf`, returning the number of bytes copied. `0` means end
    /// of stream (or an empty `buf`).
    pub async fn read(&mut self, buf: &mut [u8]) -> std::result::Result<usize, S::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending.is_empty() {
            match self.next_bounded().await? {
                Some(chunk) => self.pending = chunk,
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }

    /// Collects the remaining bounded body.
    pub async fn bytes(&mut self) -> std::result::Result<Bytes, S::Error> {
        let mut collected = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            collected.extend_from_slice(&chunk);
        }
        Ok(collected.freeze())
    }

    /// Collects the remaining bounded body as UTF-8, replacing invalid
    /// sequences. Truncation may split a multi-byte character.
    pub async fn text(&mut self) -> std::result::Result<String, S::Error> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Releases the underlying stream. Returns `true` if this call released
    /// it and `false` if it was already closed.
    pub fn close(&mut self) -> bool {
        self.pending = Bytes::new();
        self.inner.take().is_some()
    }

    async fn next_bounded(&mut self) -> std::result::Result<Option<Bytes>, S::Error> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let Some(inner) = self.inner.as_mut() else {
            return Ok(None);
        };

        match inner.next_chunk().await? {
            Some(mut chunk) => {
                if chunk.len() as u64 > self.remaining {
                    chunk.truncate(self.remaining as usize);
                }
                self.remaining -= chunk.len() as u64;
                Ok(Some(chunk))
            }
            None => Ok(None),
        }
    }
}

impl BoundedBody<reqwest::Response> {
    /// Collects the bounded body and deserializes it as JSON.
    ///
    /// A truncated body usually fails to parse and surfaces as
    /// [`Error::Decode`].
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.bytes().await.map_err(Error::Transport)?;
        serde_json::from_slice(&bytes)
            .map_err(|err| Error::Decode(format!("invalid JSON response body: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[derive(Default)]
    struct Counters {
        polls: AtomicUsize,
        releases: AtomicUsize,
    }

    struct FakeStream {
        chunks: VecDeque<std::result::Result<Bytes, io::Error>>,
        counters: Arc<Counters>,
    }

    impl Drop for FakeStream {
        fn drop(&mut self) {
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl BodyStream for FakeStream {
        type Error = io::Error;

        fn next_chunk(
            &mut self,
        ) -> impl Future<Output = std::result::Result<Option<Bytes>, io::Error>> + Send {
            self.counters.polls.fetch_add(1, Ordering::SeqCst);
            let next = self.chunks.pop_front();
            async move { next.transpose() }
        }
    }

    fn fake(chunks: &[&'static [u8]]) -> (FakeStream, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let stream = FakeStream {
            chunks: chunks
                .iter()
                .map(|chunk| Ok(Bytes::from_static(chunk)))
                .collect(),
            counters: counters.clone(),
        };
        (stream, counters)
    }

    #[tokio::test]
    async fn truncates_at_ceiling_then_reports_end_of_stream() {
        let (stream, counters) = fake(&[b"hello ", b"world", b"!!!"]);
        let mut body = BoundedBody::new(stream, 8);

        let bytes = body.bytes().await.expect("fake stream never fails");
        assert_eq!(&bytes[..], b"hello wo");
        assert_eq!(body.remaining(), 0);

        let polls = counters.polls.load(Ordering::SeqCst);
        assert!(body.chunk().await.expect("eof").is_none());
        assert_eq!(
            counters.polls.load(Ordering::SeqCst),
            polls,
            "ceiling reached, underlying stream must not be polled again"
        );

        assert!(body.close());
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn short_body_is_returned_whole() {
        let (stream, _) = fake(&[b"abc"]);
        let mut body = BoundedBody::new(stream, 1024);
        assert_eq!(body.text().await.expect("text"), "abc");
        assert_eq!(body.remaining(), 1021);
    }

    #[tokio::test]
    async fn read_copies_across_chunk_boundaries() {
        let (stream, _) = fake(&[b"abcd", b"efgh"]);
        let mut body = BoundedBody::new(stream, 6);
        let mut buf = [0u8; 3];
        let mut out = Vec::new();

        loop {
            let n = body.read(&mut buf).await.expect("read");
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }

        assert_eq!(out, b"abcdef");
        assert_eq!(body.read(&mut buf).await.expect("eof"), 0);
    }

    #[tokio::test]
    async fn zero_ceiling_yields_no_data() {
        let (stream, counters) = fake(&[b"data"]);
        let mut body = BoundedBody::new(stream, 0);
        assert!(body.chunk().await.expect("eof").is_none());
        assert_eq!(counters.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_releases_once() {
        let (stream, counters) = fake(&[b"abc"]);
        let mut body = BoundedBody::new(stream, 2);
        assert_eq!(body.bytes().await.expect("bytes").len(), 2);

        assert!(body.close());
        assert!(!body.close());
        assert!(body.is_closed());
        assert!(body.chunk().await.expect("closed body is eof").is_none());
        drop(body);

        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drop_without_close_releases() {
        let (stream, counters) = fake(&[b"abc"]);
        let body = BoundedBody::new(stream, 10);
        drop(body);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn underlying_read_error_passes_through() {
        let counters = Arc::new(Counters::default());
        let stream = FakeStream {
            chunks: VecDeque::from([
                Ok(Bytes::from_static(b"ab")),
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
            ]),
            counters: counters.clone(),
        };
        let mut body = BoundedBody::new(stream, 100);

        assert_eq!(
            body.chunk().await.expect("first chunk"),
            Some(Bytes::from_static(b"ab"))
        );
        let err = body.chunk().await.expect_err("reset must surface");
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);

        assert!(body.close());
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }
}
