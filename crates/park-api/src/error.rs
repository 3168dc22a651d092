//! Error types for the API server.
//!
//! Every failure is rendered as `{ "success": false, "error": "..." }`.
//! The message is the short user-facing one; the full error is logged.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use park_core::CoreError;
use park_ledger::LedgerError;
use park_market::MarketError;
use thiserror::Error;
use tracing::{error, warn};

use crate::envelope::Failure;

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors that can occur in the API server.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(std::net::SocketAddr, std::io::Error),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A marketplace operation failed.
    #[error(transparent)]
    Market(#[from] MarketError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Creates an invalid-request error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::BindFailed(_, _) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Market(e) => match e {
                MarketError::NotFound { .. } => StatusCode::NOT_FOUND,
                MarketError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                MarketError::SlotUnavailable { .. } | MarketError::FundsNotLocked { .. } => StatusCode::CONFLICT,
                MarketError::Ledger(e) => ledger_status(e),
            },
        }
    }

    fn user_message(&self) -> String {
        match self {
            Self::InvalidRequest(message) => message.clone(),
            Self::Market(e) => e.user_message(),
            Self::BindFailed(_, _) | Self::Internal(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

const fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
        LedgerError::Rejected { .. } => StatusCode::CONFLICT,
        LedgerError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        LedgerError::Unsupported { .. } => StatusCode::NOT_IMPLEMENTED,
        LedgerError::Transient { .. }
        | LedgerError::Rpc { .. }
        | LedgerError::Decode { .. }
        | LedgerError::Json(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request refused");
        }
        (status, Json(Failure::new(self.user_message()))).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self::Market(MarketError::Ledger(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use park_ledger::error::abort;
    use test_case::test_case;

    async fn body(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_not_found_envelope() {
        let (status, json) = body(MarketError::not_found("slot", "0x1").into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "The requested slot could not be found.");
    }

    #[tokio::test]
    async fn test_transient_detail_is_not_exposed() {
        let err: ApiError = LedgerError::transient("suix_queryEvents", "connection reset by peer").into();
        let (status, json) = body(err).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!json["error"].as_str().unwrap().contains("reset"));
    }

    #[test_case(LedgerError::rejected(abort::SLOT_UNAVAILABLE, "E_SLOT_UNAVAILABLE"), StatusCode::CONFLICT)]
    #[test_case(LedgerError::Timeout { operation: "sui_getObject".into(), timeout_ms: 10 }, StatusCode::GATEWAY_TIMEOUT)]
    #[test_case(LedgerError::unsupported("submit"), StatusCode::NOT_IMPLEMENTED)]
    #[test_case(LedgerError::Rpc { code: -32000, message: "busy".into() }, StatusCode::SERVICE_UNAVAILABLE)]
    #[test_case(LedgerError::not_found("0x9"), StatusCode::NOT_FOUND)]
    fn test_ledger_status(err: LedgerError, expected: StatusCode) {
        assert_eq!(ApiError::from(err).status(), expected);
    }

    #[test]
    fn test_slot_unavailable_is_conflict() {
        let err = ApiError::from(MarketError::SlotUnavailable { slot_id: "0x1".into() });
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
