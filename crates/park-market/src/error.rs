//! Error types for marketplace operations.

use park_core::CoreError;
use park_ledger::LedgerError;
use thiserror::Error;

/// Result type alias for marketplace operations.
pub type Result<T> = std::result::Result<T, MarketError>;

/// Errors surfaced by the marketplace.
#[derive(Debug, Error)]
pub enum MarketError {
    /// The requested entity does not exist or cannot be read.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind.
        kind: &'static str,
        /// Identifier or address looked up.
        id: String,
    },

    /// The request itself is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The pre-flight check found a conflicting reservation.
    #[error("slot {slot_id} is not available for the requested interval")]
    SlotUnavailable {
        /// Slot checked.
        slot_id: String,
    },

    /// The reservation was created but its funds could not be locked.
    #[error("reservation {reservation_id} created but funds not locked (cancelled: {cancelled}): {source}")]
    FundsNotLocked {
        /// The reservation left behind.
        reservation_id: String,
        /// Whether the compensating cancellation succeeded.
        cancelled: bool,
        /// Why locking failed.
        source: LedgerError,
    },

    /// A ledger operation failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl MarketError {
    /// Creates a not-found error.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Creates an invalid-input error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Short message safe to show to an end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { kind, .. } => format!("The requested {kind} could not be found."),
            Self::InvalidInput(message) => message.clone(),
            Self::SlotUnavailable { .. } => {
                "The slot is already booked for part of that time.".to_string()
            }
            Self::FundsNotLocked { cancelled: true, .. } => {
                "Payment could not be secured, so the reservation was cancelled.".to_string()
            }
            Self::FundsNotLocked { cancelled: false, .. } => {
                "Payment could not be secured. The reservation is pending and needs attention."
                    .to_string()
            }
            Self::Ledger(e) => e.user_message(),
        }
    }
}

impl From<CoreError> for MarketError {
    fn from(err: CoreError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_are_invalid_input() {
        let err: MarketError = CoreError::InvalidDuration(0).into();
        assert!(matches!(err, MarketError::InvalidInput(_)));
    }

    #[test]
    fn test_user_message_does_not_leak_ledger_detail() {
        let err = MarketError::Ledger(LedgerError::transient("suix_queryEvents", "connection reset"));
        assert!(!err.user_message().contains("suix"));
        assert!(!err.user_message().contains("reset"));
    }

    #[test]
    fn test_orphan_messages_differ() {
        let orphan = |cancelled| MarketError::FundsNotLocked {
            reservation_id: "0x1".into(),
            cancelled,
            source: LedgerError::rejected(5, "E_INSUFFICIENT_FUNDS"),
        };
        assert_ne!(orphan(true).user_message(), orphan(false).user_message());
    }
}
