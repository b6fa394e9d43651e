//! HTTP error mapping
//!
//! Every failure leaves the server as a JSON body `{"code", "reason"}`.
//! Malformed credentials map to 400, denied ones to 403.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use datastore_auth::{AuthError, ErrorClass};
use serde::Serialize;

/// Error returned by handlers and the capability layer
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Authorization or registration failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Request body could not be parsed
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Handler required a caller but the request carried no bound identity
    #[error("Request is not authenticated")]
    Unauthenticated,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    reason: String,
}

impl ApiError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(error) => match error.class() {
                ErrorClass::Malformed => StatusCode::BAD_REQUEST,
                ErrorClass::Denied => StatusCode::FORBIDDEN,
            },
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::FORBIDDEN,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(error) => error.code(),
            Self::InvalidBody(_) => "invalid_body",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code(),
            reason: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_error_class() {
        assert_eq!(
            ApiError::from(AuthError::bad_header("missing")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AuthError::BadSignature).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AuthError::MissingEntity).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::InvalidBody("eof".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_code_passes_through() {
        assert_eq!(
            ApiError::from(AuthError::BadSignature).code(),
            AuthError::BadSignature.code()
        );
        assert_eq!(ApiError::Unauthenticated.code(), "unauthenticated");
    }
}
