use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::money::Currency;

/// Rejections raised while turning one expense into per-participant shares.
/// All of these mean the caller sent malformed expense data.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("invalid participants: {0}")]
    InvalidParticipants(String),
    #[error("split mismatch: {0}")]
    SplitMismatch(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BalanceError {
    #[error(transparent)]
    Split(#[from] SplitError),
    /// Conservation violation: the per-currency net balances must sum to
    /// exactly zero. Only reachable through a bug or corrupted events.
    #[error("{currency} balances sum to {residual} minor units instead of zero")]
    Imbalance { currency: Currency, residual: i64 },
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] SplitError),
    #[error("unknown {kind} {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("{0}")]
    Conflict(String),
    #[error("missing or invalid credentials")]
    Unauthorized,
    #[error(transparent)]
    Balance(#[from] BalanceError),
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] bson::ser::Error),
}

impl ApiError {
    pub fn not_found(kind: &'static str, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Balance(_) | ApiError::Database(_) | ApiError::Serialize(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(%status, error = %self, "request failed");
        }
        HttpResponse::build(status).json(json!({ "error": self.to_string() }))
    }
}
