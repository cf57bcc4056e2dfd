//! Stream lifecycle tracking with exactly-once completion reporting.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures_util::Stream;
use pin_project_lite::pin_project;
use tracing::debug;

use super::error::StreamError;

/// How a tracked stream's lifecycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// The source was drained to completion.
    Completed,

    /// The source yielded an error (rendered message attached).
    Errored(String),

    /// The consumer cancelled, or dropped the stream before completion.
    Cancelled(String),
}

type ProgressFn = Box<dyn FnMut(u64) + Send>;
type FinishFn = Box<dyn FnMut(FinishReason) + Send>;

pin_project! {
    /// Pull-based wrapper that reports progress and completion.
    ///
    /// Each downstream poll pulls the source. Chunks pass through unchanged
    /// (re-chunking is [`PacedStream`](super::PacedStream)'s job upstream);
    /// the progress callback observes the cumulative byte count after each
    /// chunk.
    ///
    /// The finish callback fires exactly once per lifecycle, whichever of
    /// natural completion, source error, explicit
    /// [`cancel`](TrackedStream::cancel), or drop-before-completion happens
    /// first. The exactly-once guarantee is structural: the callback is
    /// stored in an `Option` and taken on first use.
    pub struct TrackedStream<S> {
        #[pin]
        source: S,
        bytes: u64,
        on_progress: ProgressFn,
        on_finish: Option<FinishFn>,
        fused: bool,
    }

    impl<S> PinnedDrop for TrackedStream<S> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if this.on_finish.is_some() {
                debug!("tracked stream dropped before completion");
                fire_finish(
                    this.on_finish,
                    FinishReason::Cancelled("stream dropped before completion".to_string()),
                );
            }
        }
    }
}

impl<S> std::fmt::Debug for TrackedStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedStream")
            .field("bytes", &self.bytes)
            .field("finished", &self.on_finish.is_none())
            .finish_non_exhaustive()
    }
}

impl<S> TrackedStream<S>
where
    S: Stream<Item = Result<Bytes, StreamError>>,
{
    /// Wraps `source`, reporting cumulative bytes to `on_progress` and the
    /// terminal outcome to `on_finish`.
    pub fn new(
        source: S,
        on_progress: impl FnMut(u64) + Send + 'static,
        on_finish: impl FnMut(FinishReason) + Send + 'static,
    ) -> Self {
        Self {
            source,
            bytes: 0,
            on_progress: Box::new(on_progress),
            on_finish: Some(Box::new(on_finish)),
            fused: false,
        }
    }

    /// Cumulative bytes forwarded so far.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Cancels the stream with a consumer-supplied reason.
    ///
    /// Stops pulling from the source and fires the finish callback with
    /// [`FinishReason::Cancelled`]. Subsequent polls yield end-of-stream;
    /// cancelling twice is a no-op.
    pub fn cancel(self: Pin<&mut Self>, reason: impl Into<String>) {
        let this = self.project();
        *this.fused = true;
        fire_finish(this.on_finish, FinishReason::Cancelled(reason.into()));
    }
}

fn fire_finish(slot: &mut Option<FinishFn>, reason: FinishReason) {
    if let Some(mut on_finish) = slot.take() {
        on_finish(reason);
    }
}

impl<S> Stream for TrackedStream<S>
where
    S: Stream<Item = Result<Bytes, StreamError>>,
{
    type Item = Result<Bytes, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        if *this.fused {
            return Poll::Ready(None);
        }

        match ready!(this.source.poll_next(cx)) {
            Some(Ok(chunk)) => {
                *this.bytes += chunk.len() as u64;
                (this.on_progress)(*this.bytes);
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(error)) => {
                *this.fused = true;
                fire_finish(this.on_finish, FinishReason::Errored(error.to_string()));
                Poll::Ready(Some(Err(error)))
            }
            None => {
                *this.fused = true;
                fire_finish(this.on_finish, FinishReason::Completed);
                Poll::Ready(None)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures_util::{StreamExt, stream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct Probe {
        progress: Arc<Mutex<Vec<u64>>>,
        finishes: Arc<Mutex<Vec<FinishReason>>>,
        finish_count: Arc<AtomicUsize>,
    }

    fn tracked<S>(source: S) -> (TrackedStream<S>, Probe)
    where
        S: Stream<Item = Result<Bytes, StreamError>>,
    {
        let progress = Arc::new(Mutex::new(Vec::new()));
        let finishes = Arc::new(Mutex::new(Vec::new()));
        let finish_count = Arc::new(AtomicUsize::new(0));

        let progress_sink = Arc::clone(&progress);
        let finish_sink = Arc::clone(&finishes);
        let finish_counter = Arc::clone(&finish_count);

        let stream = TrackedStream::new(
            source,
            move |bytes| progress_sink.lock().unwrap().push(bytes),
            move |reason| {
                finish_counter.fetch_add(1, Ordering::SeqCst);
                finish_sink.lock().unwrap().push(reason);
            },
        );
        (
            stream,
            Probe {
                progress,
                finishes,
                finish_count,
            },
        )
    }

    fn ok_chunks(chunks: Vec<&'static [u8]>) -> impl Stream<Item = Result<Bytes, StreamError>> {
        stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c)))
                .collect::<Vec<_>>(),
        )
    }

    // ==================== Completion Tests ====================

    #[tokio::test]
    async fn test_chunks_forwarded_unchanged_with_progress() {
        let (stream, probe) = tracked(ok_chunks(vec![b"ab", b"cde", b"f"]));
        tokio::pin!(stream);

        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item.unwrap());
        }

        assert_eq!(
            out,
            vec![
                Bytes::from_static(b"ab"),
                Bytes::from_static(b"cde"),
                Bytes::from_static(b"f")
            ]
        );
        assert_eq!(*probe.progress.lock().unwrap(), vec![2, 5, 6]);
        assert_eq!(*probe.finishes.lock().unwrap(), vec![FinishReason::Completed]);
    }

    #[tokio::test]
    async fn test_finish_fires_once_on_completion() {
        let (stream, probe) = tracked(ok_chunks(vec![b"data"]));
        tokio::pin!(stream);

        while stream.next().await.is_some() {}
        // Extra polls after end must not re-fire.
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());

        assert_eq!(probe.finish_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_source_completes_without_progress() {
        let (stream, probe) = tracked(ok_chunks(vec![]));
        tokio::pin!(stream);

        assert!(stream.next().await.is_none());
        assert!(probe.progress.lock().unwrap().is_empty());
        assert_eq!(*probe.finishes.lock().unwrap(), vec![FinishReason::Completed]);
    }

    // ==================== Error Tests ====================

    #[tokio::test]
    async fn test_source_error_finishes_once_and_fuses() {
        let items: Vec<Result<Bytes, StreamError>> = vec![
            Ok(Bytes::from_static(b"ok")),
            Err(StreamError::transform("mid-stream failure")),
            Ok(Bytes::from_static(b"unreachable")),
        ];
        let (stream, probe) = tracked(stream::iter(items));
        tokio::pin!(stream);

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());
        // Fused after the error: the trailing Ok chunk is never pulled.
        assert!(stream.next().await.is_none());

        assert_eq!(probe.finish_count.load(Ordering::SeqCst), 1);
        match &probe.finishes.lock().unwrap()[0] {
            FinishReason::Errored(msg) => assert!(msg.contains("mid-stream failure")),
            other => panic!("expected error finish, got {other:?}"),
        }
    }

    // ==================== Cancellation Tests ====================

    #[tokio::test]
    async fn test_cancel_stops_pulling_and_reports_reason() {
        let (stream, probe) = tracked(ok_chunks(vec![b"a", b"b", b"c"]));
        tokio::pin!(stream);

        assert!(stream.next().await.is_some());
        stream.as_mut().cancel("consumer lost interest");

        assert!(stream.next().await.is_none());
        assert_eq!(
            *probe.finishes.lock().unwrap(),
            vec![FinishReason::Cancelled("consumer lost interest".to_string())]
        );
    }

    #[tokio::test]
    async fn test_cancel_twice_finishes_once() {
        let (stream, probe) = tracked(ok_chunks(vec![b"a"]));
        tokio::pin!(stream);

        stream.as_mut().cancel("first");
        stream.as_mut().cancel("second");

        assert_eq!(probe.finish_count.load(Ordering::SeqCst), 1);
        assert_eq!(
            *probe.finishes.lock().unwrap(),
            vec![FinishReason::Cancelled("first".to_string())]
        );
    }

    #[tokio::test]
    async fn test_drop_before_completion_counts_as_cancellation() {
        let (stream, probe) = tracked(ok_chunks(vec![b"a", b"b"]));
        {
            tokio::pin!(stream);
            assert!(stream.next().await.is_some());
        }

        assert_eq!(probe.finish_count.load(Ordering::SeqCst), 1);
        match &probe.finishes.lock().unwrap()[0] {
            FinishReason::Cancelled(msg) => assert!(msg.contains("dropped")),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_drop_after_completion_does_not_refire() {
        let (stream, probe) = tracked(ok_chunks(vec![b"a"]));
        {
            tokio::pin!(stream);
            while stream.next().await.is_some() {}
        }

        assert_eq!(probe.finish_count.load(Ordering::SeqCst), 1);
        assert_eq!(*probe.finishes.lock().unwrap(), vec![FinishReason::Completed]);
    }
}
