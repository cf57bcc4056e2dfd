//! Error types for form encoding.

use thiserror::Error;

/// Errors produced while encoding a value tree into a form sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormError {
    /// The top-level value was not a container.
    #[error("top-level form value must be an object or array, found {found}")]
    InvalidTopLevel {
        /// Variant name of the rejected value.
        found: &'static str,
    },

    /// A leaf type the target sink cannot carry.
    #[error("value of type {ty} at '{path}' is not supported by this sink")]
    UnsupportedType {
        /// Rendered key path of the offending leaf.
        path: String,
        /// Variant name of the offending value.
        ty: &'static str,
    },

    /// A shared subtree contains itself.
    #[error("circular reference detected at '{path}'")]
    CircularReference {
        /// Rendered key path where the cycle was re-entered.
        path: String,
    },
}

impl FormError {
    /// Creates an [`FormError::InvalidTopLevel`] error.
    #[must_use]
    pub fn invalid_top_level(found: &'static str) -> Self {
        Self::InvalidTopLevel { found }
    }

    /// Creates an [`FormError::UnsupportedType`] error.
    pub fn unsupported_type(path: impl Into<String>, ty: &'static str) -> Self {
        Self::UnsupportedType {
            path: path.into(),
            ty,
        }
    }

    /// Creates a [`FormError::CircularReference`] error.
    pub fn circular_reference(path: impl Into<String>) -> Self {
        Self::CircularReference { path: path.into() }
    }
}
