use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Every way an account operation can fail.
///
/// Messages are intentionally vague: callers must not be able to tell which
/// of username, email or password was rejected.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("invalid account details")]
    Validation,

    #[error("account unavailable")]
    Conflict,

    #[error("account not found")]
    NotFound,

    #[error("invalid credentials")]
    Authentication,

    #[error("{0}")]
    State(&'static str),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AccountResult<T> = Result<T, AccountError>;

impl AccountError {
    /// Only store outages are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AccountError::StoreUnavailable(_))
    }
}

impl From<sqlx::Error> for AccountError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AccountError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => AccountError::Conflict,
            other => AccountError::StoreUnavailable(other.to_string()),
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AccountError::Validation => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                "Invalid account details".to_string(),
            ),
            AccountError::Conflict => (
                StatusCode::CONFLICT,
                "conflict",
                "Failed to create account".to_string(),
            ),
            AccountError::NotFound => (
                StatusCode::NOT_FOUND,
                "not_found",
                "Account not found".to_string(),
            ),
            AccountError::Authentication => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid credentials".to_string(),
            ),
            AccountError::State(msg) => (StatusCode::CONFLICT, "invalid_state", msg.to_string()),
            AccountError::StoreUnavailable(msg) => {
                error!(error = %msg, "store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "store_unavailable",
                    "Service temporarily unavailable".to_string(),
                )
            }
            AccountError::Internal(msg) => {
                error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (
            status,
            Json(json!({
                "error": {
                    "type": error_type,
                    "message": message
                }
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_outages_are_retryable() {
        assert!(AccountError::StoreUnavailable("timeout".into()).is_retryable());
        assert!(!AccountError::Conflict.is_retryable());
        assert!(!AccountError::Authentication.is_retryable());
        assert!(!AccountError::Internal("hash".into()).is_retryable());
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = AccountError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, AccountError::NotFound));
    }

    #[test]
    fn pool_timeout_maps_to_store_unavailable() {
        let err = AccountError::from(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
    }

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(
            AccountError::Validation.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AccountError::Conflict.into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AccountError::Authentication.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AccountError::StoreUnavailable("down".into())
                .into_response()
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
