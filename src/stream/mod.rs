//! Byte-stream pipeline stages for transfer bodies.
//!
//! This module provides the two stream adapters a transfer pipeline is built
//! from, both implementing `Stream<Item = Result<Bytes, StreamError>>` over
//! any source with the same shape:
//!
//! - [`PacedStream`] - fragments/merges chunks toward a target size and
//!   paces emission to a maximum byte rate
//! - [`TrackedStream`] - reports cumulative progress per chunk and the
//!   terminal outcome (completed, errored, cancelled) exactly once
//!
//! The stages compose: wrap a transport's byte stream in a `TrackedStream`
//! for lifecycle accounting, then in a `PacedStream` for chunk shaping and
//! throttled delivery.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use futures_util::{StreamExt, stream};
//! use byteflow::stream::{PaceOptions, PacedStream, TrackedStream};
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! let body = stream::iter(vec![Ok(Bytes::from_static(b"response body bytes"))]);
//! let tracked = TrackedStream::new(
//!     body,
//!     |bytes| println!("{bytes} bytes so far"),
//!     |reason| println!("finished: {reason:?}"),
//! );
//! let options = PaceOptions { chunk_size: 8, min_chunk_size: 1, ..PaceOptions::default() };
//! let pipeline = PacedStream::new(tracked, options).expect("valid options");
//! tokio::pin!(pipeline);
//!
//! while let Some(chunk) = pipeline.next().await {
//!     let chunk = chunk.expect("no transport errors");
//!     assert!(chunk.len() <= 8);
//! }
//! # }
//! ```

mod error;
mod pacer;
mod tracker;

pub use error::{PaceConfigError, StreamError};
pub use pacer::{DEFAULT_CHUNK_SIZE, DEFAULT_MIN_CHUNK_SIZE, PaceOptions, PacedStream};
pub use tracker::{FinishReason, TrackedStream};
