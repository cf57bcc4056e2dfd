//! Error types for the byte-stream pipeline.
//!
//! Structured errors for the paced and tracked stream stages. Context-rich
//! variants with helper constructors; callers supply the context the raw
//! source errors lack.

use thiserror::Error;

use crate::signal::AbortReason;

/// Errors surfaced on a pipeline stream's error channel.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The per-chunk transform hook failed.
    #[error("transform stage failed: {message}")]
    Transform {
        /// What went wrong inside the hook.
        message: String,
    },

    /// The transfer was aborted via a cancellation signal.
    #[error("transfer aborted: {reason}")]
    Aborted {
        /// Why the transfer was aborted.
        #[source]
        reason: AbortReason,
    },

    /// The underlying source stream failed.
    #[error("source stream error: {source}")]
    Source {
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StreamError {
    /// Creates a transform-stage error.
    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform {
            message: message.into(),
        }
    }

    /// Creates an abort error from a cancellation reason.
    #[must_use]
    pub fn aborted(reason: AbortReason) -> Self {
        Self::Aborted { reason }
    }

    /// Wraps an underlying source error.
    pub fn source(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Source {
            source: Box::new(source),
        }
    }
}

/// Invalid pacing configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaceConfigError {
    /// `chunk_size` must be positive; a zero-sized chunk can never emit.
    #[error("chunk_size must be positive")]
    ZeroChunkSize,

    /// `min_chunk_size` larger than `chunk_size` would buffer forever.
    #[error("min_chunk_size {min} exceeds chunk_size {chunk}")]
    MinChunkExceedsChunk {
        /// The offending merge threshold.
        min: usize,
        /// The configured maximum chunk size.
        chunk: usize,
    },
}
