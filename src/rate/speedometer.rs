//! Windowed byte-rate estimation over a fixed-capacity sample ring.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument};

/// Windowed throughput estimator.
///
/// Each [`push`](Speedometer::push) appends a `(now, byte_count)` sample to a
/// fixed-capacity ring buffer (oldest sample evicted FIFO on overflow) and
/// returns the smoothed rate in bytes per second, or `None` while there is
/// not yet enough data for a stable estimate.
///
/// Byte counts are signed: negative samples represent counter resets and
/// still sum correctly. The returned rate is always a non-negative integer.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use byteflow::rate::Speedometer;
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() {
/// let mut meter = Speedometer::new(10, Duration::from_secs(1));
///
/// // Too early for an estimate.
/// assert!(meter.push(1024).is_none());
/// # }
/// ```
#[derive(Debug)]
pub struct Speedometer {
    /// Retained `(timestamp, byte_delta)` samples, oldest first.
    samples: VecDeque<(Instant, i64)>,

    /// Ring capacity. Zero permanently disables estimation.
    capacity: usize,

    /// Minimum elapsed time before estimates are produced.
    ///
    /// Suppresses noisy early readings taken over a tiny window.
    min: Duration,
}

impl Speedometer {
    /// Creates an estimator retaining at most `samples_count` samples and
    /// producing no estimate until `min` has elapsed across the window.
    ///
    /// A `samples_count` of zero disables the estimator: every push returns
    /// `None`.
    #[must_use]
    #[instrument(skip_all, fields(samples_count, min_ms = min.as_millis()))]
    pub fn new(samples_count: usize, min: Duration) -> Self {
        if samples_count == 0 {
            debug!("speedometer created with zero capacity - estimation disabled");
        }
        Self {
            samples: VecDeque::with_capacity(samples_count),
            capacity: samples_count,
            min,
        }
    }

    /// Records a byte-count sample and returns the current estimate.
    ///
    /// Returns `None` when:
    /// - the estimator is disabled (zero capacity),
    /// - less than the configured minimum time has passed since the oldest
    ///   retained sample,
    /// - no time at all has passed (a rate over a zero-width window is
    ///   meaningless).
    ///
    /// Otherwise returns `round(total_window_bytes * 1000 / elapsed_ms)`,
    /// clamped to zero when negative samples outweigh positive ones.
    pub fn push(&mut self, byte_count: i64) -> Option<u64> {
        if self.capacity == 0 {
            return None;
        }

        let now = Instant::now();
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((now, byte_count));

        self.estimate(now)
    }

    /// Rate the window would report if `byte_count` were pushed right now.
    ///
    /// Does not mutate the window. Used by the paced stream to decide whether
    /// an emission would exceed its rate budget before committing to it.
    #[must_use]
    pub fn projected(&self, byte_count: i64) -> Option<u64> {
        if self.capacity == 0 {
            return None;
        }

        let now = Instant::now();
        let skip = usize::from(self.samples.len() == self.capacity);
        let (oldest, _) = if skip < self.samples.len() {
            self.samples[skip]
        } else {
            (now, 0)
        };

        let elapsed = now.duration_since(oldest);
        if elapsed < self.min || elapsed.is_zero() {
            return None;
        }

        let total: i64 = self.samples.iter().skip(skip).map(|(_, b)| *b).sum::<i64>() + byte_count;
        Some(Self::rate_of(total, elapsed))
    }

    /// Number of samples currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true when no samples are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn estimate(&self, now: Instant) -> Option<u64> {
        let (oldest, _) = *self.samples.front()?;
        let elapsed = now.duration_since(oldest);
        if elapsed < self.min || elapsed.is_zero() {
            return None;
        }

        let total: i64 = self.samples.iter().map(|(_, b)| *b).sum();
        Some(Self::rate_of(total, elapsed))
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn rate_of(total_bytes: i64, elapsed: Duration) -> u64 {
        let rate = (total_bytes as f64 * 1000.0 / elapsed.as_millis() as f64).round();
        if rate > 0.0 { rate as u64 } else { 0 }
    }
}
