//! The four error kinds the coordination kernel can raise, and how they
//! become HTTP responses at the handler boundary.
//!
//! Nothing below `src/server/` depends on axum or HTTP status codes; the
//! component layer only ever returns `AppError`, and `IntoResponse` is the
//! single place that decides what a client sees.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized: Missing 'X-API-Key' header.")]
    MissingApiKey,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::MissingApiKey | Self::Unauthorized => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::MissingApiKey | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Internal errors never leak detail;
    /// the detail goes to the log instead.
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Legacy response shape: plain-text body for errors.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.client_message();
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct StructuredErrorBody<'a> {
    error: StructuredError<'a>,
}

#[derive(Serialize)]
struct StructuredError<'a> {
    code: &'a str,
    message: String,
}

/// Wraps an `AppError` to produce the structured `/api/v1/...` error shape
/// instead of the legacy plain-text body.
pub struct ApiV1Error(pub AppError);

impl From<AppError> for ApiV1Error {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiV1Error {
    fn into_response(self) -> Response {
        let status = self.0.status();
        let code = self.0.code();
        let message = self.0.client_message();
        (status, axum::Json(StructuredErrorBody {
            error: StructuredError { code, message },
        }))
            .into_response()
    }
}
