//! Error types for park-core.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while constructing or validating domain values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Identifier or address is not a `0x`-prefixed hex string.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Coordinates fall outside the valid latitude/longitude range.
    #[error("invalid coordinates: lat {lat}, lng {lng}")]
    InvalidCoordinates {
        /// Latitude in micro-degrees.
        lat: i64,
        /// Longitude in micro-degrees.
        lng: i64,
    },

    /// Time window is empty or inverted.
    #[error("invalid time window: start {start_ms} must be before end {end_ms}")]
    InvalidWindow {
        /// Window start (ms since epoch).
        start_ms: u64,
        /// Window end (ms since epoch).
        end_ms: u64,
    },

    /// Reservation duration is zero or too large.
    #[error("invalid duration: {0} hours")]
    InvalidDuration(u64),

    /// State change that would move an entity backwards.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    /// Unknown enum discriminant or name.
    #[error("unknown {kind}: {value}")]
    UnknownVariant {
        /// Which enum was being parsed.
        kind: &'static str,
        /// The offending value.
        value: String,
    },
}

impl CoreError {
    /// Create an unknown-variant error.
    #[must_use]
    pub fn unknown_variant(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.into(),
        }
    }
}
