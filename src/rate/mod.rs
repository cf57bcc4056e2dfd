//! Throughput sampling and call throttling primitives.
//!
//! This module provides the two leaf components of the transfer pipeline:
//!
//! - [`Speedometer`] - a windowed byte-rate estimator fed with
//!   `(timestamp, byte_count)` samples
//! - [`Throttle`] - a wrapper that invokes a callback at most once per time
//!   budget, with a trailing invocation carrying the last arguments
//!
//! Both are consumed by the higher stages: the paced stream uses the
//! speedometer to project emission rates, and the progress reducer combines
//! both to turn raw byte counts into throttled structured events.
//!
//! All timing goes through [`tokio::time`], so tests can drive these
//! deterministically with a paused clock.

mod speedometer;
mod throttle;

pub use speedometer::Speedometer;
pub use throttle::Throttle;
