//! Query-service error envelope (§4.10): every failure response is
//! `{ok:false, error, message?}` with one of a fixed set of error codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::errors::{NotFoundError, StorageError, ValidationError};

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    InvalidTicker(String),
    InvalidWindowDays(String),
    InvalidLimit(String),
    MissingParam(&'static str),
    NotFound(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    ok: bool,
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl ApiError {
    fn code(&self) -> (&'static str, StatusCode) {
        match self {
            ApiError::Unauthorized => ("unauthorized", StatusCode::UNAUTHORIZED),
            ApiError::InvalidTicker(_) => ("invalid_ticker", StatusCode::BAD_REQUEST),
            ApiError::InvalidWindowDays(_) => ("invalid_window_days", StatusCode::BAD_REQUEST),
            ApiError::InvalidLimit(_) => ("invalid_limit", StatusCode::BAD_REQUEST),
            ApiError::MissingParam(_) => ("missing_param", StatusCode::BAD_REQUEST),
            ApiError::NotFound(_) => ("not_found", StatusCode::NOT_FOUND),
            ApiError::Internal(_) => ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    fn message(&self) -> Option<String> {
        match self {
            ApiError::Unauthorized => None,
            ApiError::InvalidTicker(m)
            | ApiError::InvalidWindowDays(m)
            | ApiError::InvalidLimit(m)
            | ApiError::NotFound(m)
            | ApiError::Internal(m) => Some(m.clone()),
            ApiError::MissingParam(p) => Some(format!("missing required parameter: {p}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (error, status) = self.code();
        let body = ErrorBody { ok: false, error, message: self.message() };
        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::InvalidTicker { ticker } => ApiError::InvalidTicker(ticker),
            ValidationError::InvalidTimeframe { tf } => ApiError::InvalidTicker(tf),
            ValidationError::InvalidLimit { limit, max } => {
                ApiError::InvalidLimit(format!("{limit} (must be in [1,{max}])"))
            }
            ValidationError::InvalidWindowDays { window_days } => {
                ApiError::InvalidWindowDays(window_days.to_string())
            }
            ValidationError::MissingParam { param } => ApiError::MissingParam(param),
        }
    }
}

impl From<NotFoundError> for ApiError {
    fn from(e: NotFoundError) -> Self {
        ApiError::NotFound(e.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}
