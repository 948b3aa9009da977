use axum::http::StatusCode;
use thiserror::Error;

use crate::error::ApiError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Strategy '{0}' is already registered")]
    DuplicateStrategy(String),

    #[error("Unknown authentication strategy '{0}'")]
    UnknownStrategy(String),

    #[error("Missing bearer token")]
    MissingCredentials,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Identity provider unavailable: {0}")]
    Provider(String),
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        let status = match &error {
            AuthError::MissingCredentials
            | AuthError::TokenExpired
            | AuthError::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            AuthError::Provider(_) => StatusCode::BAD_GATEWAY,
            AuthError::DuplicateStrategy(_) | AuthError::UnknownStrategy(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status == StatusCode::UNAUTHORIZED {
            ApiError::unauthorized("Unauthorized").with_stack(error.to_string())
        } else {
            ApiError::new(status, error.to_string())
        }
    }
}
