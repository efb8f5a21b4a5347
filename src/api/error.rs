//! API Error Responses
//!
//! Every failure becomes `{ error, code, category }` with a status chosen
//! by category.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::common::error::{ErrorCategory, SettlementError};

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    pub category: ErrorCategory,
}

/// Handler error
#[derive(Debug)]
pub enum ApiError {
    /// Failure raised by the settlement service
    Settlement(SettlementError),
    /// Request-level failure detected before reaching the service
    Request {
        category: ErrorCategory,
        code: &'static str,
        message: String,
    },
}

impl ApiError {
    pub fn malformed(code: &'static str, message: impl Into<String>) -> Self {
        Self::Request {
            category: ErrorCategory::Malformed,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::Request {
            category: ErrorCategory::NotFound,
            code,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Settlement(e) => e.category(),
            ApiError::Request { category, .. } => *category,
        }
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.category())
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::Settlement(e) => ErrorBody {
                error: e.to_string(),
                code: e.error_code().to_string(),
                category: e.category(),
            },
            ApiError::Request {
                category,
                code,
                message,
            } => ErrorBody {
                error: message.clone(),
                code: code.to_string(),
                category: *category,
            },
        }
    }
}

/// HTTP status for a failure category
pub fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::Malformed => StatusCode::BAD_REQUEST,
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::Precondition => StatusCode::CONFLICT,
        ErrorCategory::UnknownInput => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCategory::Invariant | ErrorCategory::Infrastructure => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        ApiError::Settlement(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
