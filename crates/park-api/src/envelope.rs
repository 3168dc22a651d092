//! The `{ "success": ... }` response envelope.
//!
//! Callers branch on `success`, not on the status code. Success payloads
//! are flattened next to the flag, so every payload is a struct or map.

use axum::Json;
use serde::Serialize;

/// A successful response.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    /// Always `true`.
    pub success: bool,
    /// The payload's fields.
    #[serde(flatten)]
    pub payload: T,
}

/// A failed response.
#[derive(Debug, Serialize)]
pub struct Failure {
    /// Always `false`.
    pub success: bool,
    /// Short, human-readable message.
    pub error: String,
}

impl Failure {
    /// A failure carrying `error`.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// Wraps a payload in a success envelope.
pub fn ok<T: Serialize>(payload: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        payload,
    })
}
