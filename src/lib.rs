//! Byteflow Transfer Plumbing Library
//!
//! This library provides the transfer-side plumbing an HTTP client needs
//! around its transport: throughput estimation, rate-limited chunk pacing,
//! progress reporting, cooperative cancellation, and recursive form
//! encoding.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`rate`] - windowed throughput sampling and callback throttling
//! - [`stream`] - byte-stream stages: rate-paced chunk shaping and
//!   lifecycle tracking
//! - [`progress`] - raw byte counts reduced into structured progress events
//! - [`signal`] - abort signals, controllers, and signal/timeout composition
//! - [`form`] - nested value trees flattened to form entries and back

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod form;
pub mod progress;
pub mod rate;
pub mod signal;
pub mod stream;

// Re-export commonly used types
pub use form::{FormEntries, FormOptions, FormValue, form_data_to_json, to_form_data};
pub use progress::{Direction, ProgressEvent, ProgressReducer, ProgressUpdate};
pub use rate::{Speedometer, Throttle};
pub use signal::{AbortController, AbortReason, AbortSignal, ComposedSignal, compose_signals};
pub use stream::{FinishReason, PaceOptions, PacedStream, StreamError, TrackedStream};
