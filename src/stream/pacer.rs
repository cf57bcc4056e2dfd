//! Rate-limited re-chunking stream stage.
//!
//! [`PacedStream`] sits between a raw byte source and its consumer. It
//! fragments and merges chunks toward a target size and, when a rate cap is
//! configured, paces emission so the observed throughput stays at or below
//! the cap. Backpressure is applied by scheduling (an armed sleep), never by
//! dropping data: the concatenation of emitted chunks always equals the
//! concatenation of input chunks.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio::time::{Instant, Sleep};
use tracing::{debug, instrument};

use super::error::{PaceConfigError, StreamError};
use crate::rate::Speedometer;

/// Default maximum emitted chunk size (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default merge threshold below which trailing bytes are buffered.
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 100;

/// Default sampling window for the internal rate estimate.
const DEFAULT_TIME_WINDOW: Duration = Duration::from_millis(500);

/// Default divisor applied to the window to get the estimator's minimum
/// measurement time.
const DEFAULT_TICKS_RATE: u32 = 2;

/// Samples retained by the internal estimator.
const PACER_SAMPLES: usize = 10;

/// Configuration for a [`PacedStream`].
///
/// # Default Values
///
/// - `max_rate`: 0 (unlimited)
/// - `chunk_size`: 64 KiB
/// - `min_chunk_size`: 100 bytes
/// - `time_window`: 500 ms
/// - `ticks_rate`: 2
#[derive(Debug, Clone)]
pub struct PaceOptions {
    /// Maximum emission rate in bytes per second; 0 disables pacing.
    pub max_rate: u64,

    /// Maximum size of an emitted chunk.
    pub chunk_size: usize,

    /// Merge threshold: buffered tails smaller than this wait for more data
    /// (or end-of-stream, which flushes them).
    pub min_chunk_size: usize,

    /// Time window the internal rate estimator averages over.
    pub time_window: Duration,

    /// Divisor applied to `time_window` for the estimator's minimum
    /// measurement time.
    pub ticks_rate: u32,
}

impl Default for PaceOptions {
    fn default() -> Self {
        Self {
            max_rate: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            time_window: DEFAULT_TIME_WINDOW,
            ticks_rate: DEFAULT_TICKS_RATE,
        }
    }
}

impl PaceOptions {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PaceConfigError`] when `chunk_size` is zero or
    /// `min_chunk_size` exceeds `chunk_size`.
    pub fn validate(&self) -> Result<(), PaceConfigError> {
        if self.chunk_size == 0 {
            return Err(PaceConfigError::ZeroChunkSize);
        }
        if self.min_chunk_size > self.chunk_size {
            return Err(PaceConfigError::MinChunkExceedsChunk {
                min: self.min_chunk_size,
                chunk: self.chunk_size,
            });
        }
        Ok(())
    }

    fn sampler_min(&self) -> Duration {
        self.time_window / self.ticks_rate.max(1)
    }
}

type TransformFn = Box<dyn FnMut(Bytes) -> Result<Bytes, StreamError> + Send>;
type ProgressFn = Box<dyn FnMut(u64) + Send>;

pin_project! {
    /// Duplex byte-stream stage: re-chunks input and paces emission.
    ///
    /// Wraps any `Stream<Item = Result<Bytes, StreamError>>` and implements
    /// the same. Chunks are emitted in input order; an armed pacing sleep is
    /// the only suspension the stage adds on top of the source's own
    /// readiness.
    ///
    /// On a source error, buffered bytes are flushed first, then the error
    /// is yielded, then the stream fuses. End-of-stream flushes any
    /// sub-threshold tail as a final short chunk.
    ///
    /// # Example
    ///
    /// ```
    /// use bytes::Bytes;
    /// use futures_util::{StreamExt, stream};
    /// use byteflow::stream::{PaceOptions, PacedStream};
    ///
    /// # #[tokio::main(flavor = "current_thread")] async fn main() {
    /// let source = stream::iter(vec![Ok(Bytes::from_static(b"hello world"))]);
    /// let options = PaceOptions { chunk_size: 4, min_chunk_size: 1, ..PaceOptions::default() };
    /// let paced = PacedStream::new(source, options).expect("valid options");
    /// tokio::pin!(paced);
    ///
    /// let mut out = Vec::new();
    /// while let Some(chunk) = paced.next().await {
    ///     out.extend_from_slice(&chunk.expect("no source errors"));
    /// }
    /// assert_eq!(out, b"hello world");
    /// # }
    /// ```
    pub struct PacedStream<S> {
        #[pin]
        source: S,
        #[pin]
        delay: Option<Sleep>,
        options: PaceOptions,
        buf: BytesMut,
        meter: Speedometer,
        last_emit: Option<Instant>,
        bytes_seen: u64,
        source_done: bool,
        pending_error: Option<StreamError>,
        transform: Option<TransformFn>,
        on_progress: Option<ProgressFn>,
    }
}

impl<S> std::fmt::Debug for PacedStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacedStream")
            .field("options", &self.options)
            .field("buffered", &self.buf.len())
            .field("bytes_seen", &self.bytes_seen)
            .field("source_done", &self.source_done)
            .finish_non_exhaustive()
    }
}

impl<S> PacedStream<S>
where
    S: Stream<Item = Result<Bytes, StreamError>>,
{
    /// Creates a paced stage over `source`.
    ///
    /// # Errors
    ///
    /// Returns [`PaceConfigError`] when the options are invalid.
    #[instrument(skip(source), fields(max_rate = options.max_rate, chunk_size = options.chunk_size))]
    pub fn new(source: S, options: PaceOptions) -> Result<Self, PaceConfigError> {
        options.validate()?;
        debug!("creating paced stream");
        let meter = Speedometer::new(PACER_SAMPLES, options.sampler_min());
        Ok(Self {
            source,
            delay: None,
            options,
            buf: BytesMut::new(),
            meter,
            last_emit: None,
            bytes_seen: 0,
            source_done: false,
            pending_error: None,
            transform: None,
            on_progress: None,
        })
    }

    /// Invokes `callback` with cumulative bytes seen after each emission.
    #[must_use]
    pub fn with_progress(mut self, callback: impl FnMut(u64) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Applies `transform` to every input chunk before buffering.
    ///
    /// A hook failure is surfaced as [`StreamError::Transform`] after any
    /// already-buffered bytes have been flushed.
    #[must_use]
    pub fn with_transform(
        mut self,
        transform: impl FnMut(Bytes) -> Result<Bytes, StreamError> + Send + 'static,
    ) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Cumulative bytes emitted so far.
    #[must_use]
    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    /// How long emission of `len` bytes must still wait, if at all.
    ///
    /// The estimator's projected rate grants early emission when the window
    /// has spare budget; otherwise the chunk is spaced to
    /// `len * 1000 / max_rate` milliseconds from the previous emission.
    fn pace_wait(
        meter: &Speedometer,
        options: &PaceOptions,
        last_emit: Option<Instant>,
        len: usize,
    ) -> Option<Duration> {
        let last = last_emit?;
        if meter
            .projected(i64::try_from(len).unwrap_or(i64::MAX))
            .is_some_and(|rate| rate <= options.max_rate)
        {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let required = Duration::from_secs_f64(len as f64 / options.max_rate as f64);
        let elapsed = Instant::now().duration_since(last);
        (elapsed < required).then(|| required - elapsed)
    }
}

impl<S> Stream for PacedStream<S>
where
    S: Stream<Item = Result<Bytes, StreamError>>,
{
    type Item = Result<Bytes, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            // An armed pacing sleep gates everything else.
            if let Some(delay) = this.delay.as_mut().as_pin_mut() {
                ready!(delay.poll(cx));
                this.delay.set(None);
            }

            let buffered = this.buf.len();
            let emit_len = if buffered >= this.options.chunk_size {
                Some(this.options.chunk_size)
            } else if buffered > 0
                && (*this.source_done || buffered >= this.options.min_chunk_size)
            {
                Some(buffered)
            } else {
                None
            };

            if let Some(len) = emit_len {
                if this.options.max_rate > 0 {
                    if let Some(wait) =
                        Self::pace_wait(this.meter, this.options, *this.last_emit, len)
                    {
                        debug!(wait_ms = wait.as_millis(), len, "pacing emission");
                        this.delay.set(Some(tokio::time::sleep(wait)));
                        continue;
                    }
                }

                let chunk = this.buf.split_to(len).freeze();
                if this.options.max_rate > 0 {
                    this.meter.push(i64::try_from(len).unwrap_or(i64::MAX));
                }
                *this.last_emit = Some(Instant::now());
                *this.bytes_seen += len as u64;
                if let Some(on_progress) = this.on_progress.as_mut() {
                    on_progress(*this.bytes_seen);
                }
                return Poll::Ready(Some(Ok(chunk)));
            }

            if *this.source_done {
                if let Some(error) = this.pending_error.take() {
                    return Poll::Ready(Some(Err(error)));
                }
                return Poll::Ready(None);
            }

            match ready!(this.source.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => {
                    let chunk = match this.transform.as_mut() {
                        Some(transform) => match transform(chunk) {
                            Ok(chunk) => chunk,
                            Err(error) => {
                                *this.source_done = true;
                                *this.pending_error = Some(error);
                                continue;
                            }
                        },
                        None => chunk,
                    };
                    this.buf.extend_from_slice(&chunk);
                }
                Some(Err(error)) => {
                    *this.source_done = true;
                    *this.pending_error = Some(error);
                }
                None => {
                    *this.source_done = true;
                }
            }
        }
    }
}
