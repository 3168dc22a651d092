//! Error types for ledger access.

use thiserror::Error;

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Abort codes raised by the ledger program.
pub mod abort {
    /// The caller already owns a profile.
    pub const ALREADY_REGISTERED: u64 = 1;
    /// The requested interval overlaps a live reservation.
    pub const SLOT_UNAVAILABLE: u64 = 2;
    /// The object is not in a state that allows the call.
    pub const INVALID_STATE: u64 = 3;
    /// The sender is not allowed to make the call.
    pub const NOT_AUTHORIZED: u64 = 4;
    /// No coins were supplied to fund an escrow.
    pub const INSUFFICIENT_FUNDS: u64 = 5;
    /// An argument is malformed or out of range.
    pub const INVALID_ARGUMENT: u64 = 6;
    /// Funds are already locked for the reservation.
    pub const ESCROW_LOCKED: u64 = 7;
}

/// Errors that can occur while talking to the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A referenced object does not exist.
    #[error("object not found: {id}")]
    NotFound {
        /// Object identifier.
        id: String,
    },

    /// An object exists but cannot be decoded into its domain shape.
    #[error("cannot decode {kind} {id}: {message}")]
    Decode {
        /// Entity kind being decoded.
        kind: &'static str,
        /// Object identifier.
        id: String,
        /// What was wrong.
        message: String,
    },

    /// The node could not be reached or failed to answer.
    #[error("transient ledger failure during {operation}: {message}")]
    Transient {
        /// Operation that failed.
        operation: String,
        /// Transport-level description.
        message: String,
    },

    /// The ledger program refused a write.
    #[error("rejected by ledger program (abort code {code}): {reason}")]
    Rejected {
        /// Abort code.
        code: u64,
        /// Reason reported by the program.
        reason: String,
    },

    /// A call did not complete in time.
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },

    /// The client cannot perform this operation.
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// Operation requested.
        operation: String,
    },

    /// A response body was not the JSON we expected.
    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),
}

impl LedgerError {
    /// Creates a not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates a transient error.
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a rejection with an abort code.
    pub fn rejected(code: u64, reason: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            reason: reason.into(),
        }
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Whether this is the program's duplicate-registration rejection.
    ///
    /// Callers treat it as success: the profile they wanted exists.
    #[must_use]
    pub fn is_already_registered(&self) -> bool {
        match self {
            Self::Rejected { code, reason } => {
                *code == abort::ALREADY_REGISTERED
                    || reason.to_ascii_lowercase().contains("already registered")
            }
            _ => false,
        }
    }

    /// Whether retrying later could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. } | Self::Rpc { .. })
    }

    /// Short message safe to show to an end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { .. } => "The requested item could not be found.".to_string(),
            Self::Decode { .. } | Self::Json(_) => {
                "The ledger returned data that could not be read.".to_string()
            }
            Self::Transient { .. } | Self::Rpc { .. } => {
                "The ledger is temporarily unreachable. Please try again.".to_string()
            }
            Self::Timeout { .. } => "The ledger took too long to respond.".to_string(),
            Self::Rejected { code, reason } => format!("Request rejected ({code}): {reason}"),
            Self::Unsupported { .. } => "This operation is not available.".to_string(),
        }
    }
}
