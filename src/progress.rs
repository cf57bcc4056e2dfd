//! Progress event reduction for transfer bodies.
//!
//! This module turns raw byte-count updates into throttled, structured
//! [`ProgressEvent`]s carrying completion ratio, smoothed byte rate, and a
//! time-remaining estimate. It composes the [`rate`](crate::rate)
//! primitives: a [`Throttle`] caps listener frequency and a [`Speedometer`]
//! smooths the rate.
//!
//! Raw values are deliberately preserved: `progress` above 1.0 and negative
//! `bytes` deltas (from resetting counters) are passed through unclamped,
//! since consumers may rely on them.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use byteflow::progress::{Direction, ProgressReducer, ProgressUpdate};
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! let reducer = ProgressReducer::with_frequency(
//!     |event| println!("{:.0}%", event.progress.unwrap_or(0.0) * 100.0),
//!     Direction::Download,
//!     Duration::ZERO, // unthrottled
//! );
//!
//! reducer.report(ProgressUpdate { loaded: 512, total: Some(1024) });
//! reducer.finish();
//! # }
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::instrument;

use crate::rate::{Speedometer, Throttle};

/// Default listener frequency: 3 notifications per second.
const DEFAULT_FREQ: Duration = Duration::from_millis(333);

/// Sample capacity of the reducer's internal rate estimator.
const REDUCER_SAMPLES: usize = 50;

/// Minimum measurement time of the reducer's internal rate estimator.
const REDUCER_MIN: Duration = Duration::from_millis(250);

/// Which way the tracked bytes are flowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Request body leaving the client.
    Upload,
    /// Response body arriving at the client.
    Download,
}

/// A raw byte-count observation from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Bytes transferred so far, as reported by the transport.
    pub loaded: u64,
    /// Expected total, when the transport knows it.
    pub total: Option<u64>,
}

/// A structured progress notification.
///
/// Serializes to JSON for listeners that forward events off-process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    /// Bytes transferred so far.
    pub loaded: u64,
    /// Expected total, when known.
    pub total: Option<u64>,
    /// `loaded / total` when the total is known and positive. Not clamped:
    /// servers that understate the total produce values above 1.0.
    pub progress: Option<f64>,
    /// Delta of `loaded` since the previous notification. Negative when the
    /// transport's counter reset; the baseline resets with it.
    pub bytes: i64,
    /// Smoothed transfer rate in bytes per second, once measurable.
    pub rate: Option<u64>,
    /// Estimated seconds remaining, when rate and total are known and
    /// `loaded` has not overshot the total.
    pub estimated: Option<f64>,
    /// Whether the transport reported a total.
    pub length_computable: bool,
    /// Transfer direction.
    pub direction: Direction,
}

/// Reduces raw byte counts into throttled [`ProgressEvent`]s.
///
/// Clone-able handle; clones feed the same listener and share one baseline.
/// Internally this is a [`Throttle`] around the reduction, so listener
/// invocations follow throttle semantics: immediate first delivery, trailing
/// delivery of the freshest update per window, and [`finish`](Self::finish)
/// as the explicit flush at end of transfer.
#[derive(Debug, Clone)]
pub struct ProgressReducer {
    throttle: Throttle<ProgressUpdate>,
}

impl ProgressReducer {
    /// Creates a reducer delivering at most 3 events per second.
    #[must_use]
    pub fn new(
        listener: impl FnMut(ProgressEvent) + Send + 'static,
        direction: Direction,
    ) -> Self {
        Self::with_frequency(listener, direction, DEFAULT_FREQ)
    }

    /// Creates a reducer with an explicit notification window.
    ///
    /// A window of [`Duration::ZERO`] delivers every update synchronously.
    #[must_use]
    #[instrument(skip(listener), fields(freq_ms = freq.as_millis()))]
    pub fn with_frequency(
        mut listener: impl FnMut(ProgressEvent) + Send + 'static,
        direction: Direction,
        freq: Duration,
    ) -> Self {
        let mut meter = Speedometer::new(REDUCER_SAMPLES, REDUCER_MIN);
        let mut notified: u64 = 0;

        let throttle = Throttle::new(freq, move |update: ProgressUpdate| {
            let loaded = update.loaded;
            let total = update.total;

            #[allow(clippy::cast_possible_wrap)]
            let bytes = loaded as i64 - notified as i64;
            notified = loaded;

            let rate = meter.push(bytes);
            let in_range = total.is_some_and(|t| loaded <= t);

            #[allow(clippy::cast_precision_loss)]
            let progress = total.and_then(|t| (t > 0).then(|| loaded as f64 / t as f64));

            #[allow(clippy::cast_precision_loss)]
            let estimated = match (rate, total) {
                (Some(rate), Some(total)) if rate > 0 && in_range => {
                    Some((total - loaded) as f64 / rate as f64)
                }
                _ => None,
            };

            listener(ProgressEvent {
                loaded,
                total,
                progress,
                bytes,
                rate,
                estimated,
                length_computable: total.is_some(),
                direction,
            });
        });

        Self { throttle }
    }

    /// Feeds a raw observation into the reducer.
    pub fn report(&self, update: ProgressUpdate) {
        self.throttle.call(update);
    }

    /// Delivers any pending update immediately.
    ///
    /// Call at end of transfer so the final byte count is never lost to the
    /// throttle window.
    pub fn finish(&self) {
        self.throttle.flush();
    }
}

/// Decorates a listener so invocations run on a spawned task instead of
/// inline on the byte-processing path.
///
/// Slow or panicking listeners then cannot stall or unwind into the
/// transfer itself. Delivery order is preserved per listener only as far as
/// the runtime schedules the spawned tasks; use an inline listener when
/// strict ordering matters more than isolation.
pub fn async_listener<T: Send + 'static>(
    listener: impl FnMut(T) + Send + 'static,
) -> impl FnMut(T) + Send + 'static {
    let listener = Arc::new(Mutex::new(listener));
    move |event: T| {
        let listener = Arc::clone(&listener);
        tokio::spawn(async move {
            (listener.lock().unwrap_or_else(PoisonError::into_inner))(event);
        });
    }
}
