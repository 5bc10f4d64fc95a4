use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Error taxonomy for the whole service. The store and identity layers
/// translate their transport errors into these kinds; handlers never see a
/// raw redis or serde error.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Invalid credentials. Please check your email and password.")]
    InvalidCredentials,

    #[error("Too many failed attempts. Please try again later.")]
    TooManyAttempts,

    #[error("This email is already registered. Please log in instead.")]
    AlreadyExists,

    #[error("Complaint not found")]
    NotFound,

    #[error("Permission denied. Please check the store access rules.")]
    PermissionDenied,

    #[error("Service temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Unknown(String),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            AppError::AlreadyExists => StatusCode::CONFLICT,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::PermissionDenied => StatusCode::FORBIDDEN,
            AppError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unknown { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        if matches!(err.code(), Some("NOAUTH") | Some("NOPERM")) {
            return AppError::PermissionDenied;
        }

        if err.is_timeout() || err.is_io_error() || err.is_connection_dropped() {
            return AppError::Unavailable(err.to_string());
        }

        AppError::Unknown(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Unknown(format!("record decode failed: {err}"))
    }
}
