use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum BrokerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("could not connect to target database: {0}")]
    Connect(String),

    #[error("could not decrypt stored secret, check the configured secret key")]
    Decrypt,

    #[error("could not encrypt secret: {0}")]
    Encrypt(String),

    /// The login step failed and its storage object was removed again.
    #[error("could not create account ({account}): {reason}")]
    AccountCreate { account: String, reason: String },

    #[error("could not grant role {role} to {account}: {reason}")]
    Grant {
        account: String,
        role: String,
        reason: String,
    },

    #[error("could not drop {stage} ({account}): {reason}")]
    Drop {
        account: String,
        stage: DropStage,
        reason: String,
    },

    /// Cleanup after a failure failed too; the target may be inconsistent.
    #[error("could not {action} after failure ({original}): {reason}")]
    Compensation {
        action: String,
        reason: String,
        original: String,
    },

    #[error("could not bookmark account {account}")]
    Bookmark { account: String },

    #[error("request deadline exceeded before {stage}")]
    Cancelled { stage: &'static str },

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which half of an account removal failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropStage {
    Account,
    Tablespace,
}

impl std::fmt::Display for DropStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropStage::Account => f.write_str("account"),
            DropStage::Tablespace => f.write_str("tablespace"),
        }
    }
}

impl BrokerError {
    pub fn missing(field: &str) -> Self {
        BrokerError::Validation(format!("{field} is missing"))
    }

    pub fn bad_token() -> Self {
        BrokerError::NotFound("bad token".to_string())
    }

    /// Errors the caller caused; everything else is worth an operator's attention.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BrokerError::Validation(_) | BrokerError::NotFound(_) | BrokerError::Duplicate(_)
        )
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            BrokerError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "VALIDATION".to_string(),
                    message: msg,
                },
            ),
            BrokerError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ApiErrorBody {
                    code: "BAD_TOKEN".to_string(),
                    message: msg,
                },
            ),
            BrokerError::Duplicate(msg) => (
                StatusCode::CONFLICT,
                ApiErrorBody {
                    code: "DUPLICATE".to_string(),
                    message: msg,
                },
            ),
            BrokerError::Connect(_)
            | BrokerError::Decrypt
            | BrokerError::Encrypt(_)
            | BrokerError::DatabaseError(_)
            | BrokerError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                },
            ),
            e @ (BrokerError::AccountCreate { .. }
            | BrokerError::Grant { .. }
            | BrokerError::Drop { .. }
            | BrokerError::Compensation { .. }
            | BrokerError::Bookmark { .. }) => {
                let code = match &e {
                    BrokerError::AccountCreate { .. } => "ACCOUNT_CREATE_FAILED",
                    BrokerError::Grant { .. } => "GRANT_FAILED",
                    BrokerError::Drop { .. } => "DROP_FAILED",
                    BrokerError::Compensation { .. } => "COMPENSATION_FAILED",
                    _ => "BOOKMARK_FAILED",
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorBody {
                        code: code.to_string(),
                        message: e.to_string(),
                    },
                )
            }
            e @ BrokerError::Cancelled { .. } => (
                StatusCode::GATEWAY_TIMEOUT,
                ApiErrorBody {
                    code: "TIMEOUT".to_string(),
                    message: e.to_string(),
                },
            ),
        };
        (status, Json(ApiErrorResponse { error: error_body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
