/// Error handling for the API server
///
/// Handlers return `Result<T, ApiError>`. Every error renders as the common
/// response envelope with `"status": "fail"`, so clients parse success and
/// failure the same way:
///
/// ```json
/// { "message": "Invalid email or password", "status": "fail", "data": null }
/// ```
///
/// Internal errors are logged and replaced by a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tenancy_shared::identity::IdentityError;
use tenancy_shared::store::StoreError;

/// Client-facing message for every rejected token
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409), e.g. duplicate email
    Conflict(String),

    /// Unprocessable entity (422)
    ValidationError(Vec<ValidationErrorDetail>),

    /// Internal server error (500)
    InternalError(String),

    /// Bad gateway (502): an upstream collaborator such as the mail provider failed
    BadGateway(String),

    /// Service unavailable (503)
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

/// Failure envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,

    /// Always `"fail"`
    pub status: String,

    /// Validation details, otherwise null
    pub data: Option<Vec<ValidationErrorDetail>>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::BadGateway(msg) => write!(f, "Bad gateway: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, data) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::BadGateway(msg) => {
                tracing::warn!("Upstream failure: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "Failed to send email, please try again later".to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg, None),
        };

        let body = Json(ErrorResponse {
            message,
            status: "fail".to_string(),
            data,
        });

        (status, body).into_response()
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Validation(msg) => ApiError::ValidationError(vec![ValidationErrorDetail {
                field: "request".to_string(),
                message: msg,
            }]),
            IdentityError::DuplicateEmail => ApiError::Conflict(err.to_string()),
            IdentityError::AuthenticationFailure => {
                ApiError::Unauthorized("Invalid email or password!".to_string())
            }
            IdentityError::InvalidToken(rejection) => {
                tracing::debug!(reason = %rejection, "Token rejected");
                ApiError::Unauthorized(INVALID_TOKEN_MESSAGE.to_string())
            }
            IdentityError::MissingClaims => ApiError::BadRequest(err.to_string()),
            IdentityError::NotFound(_)
            | IdentityError::UserNotFound
            | IdentityError::RoleNotFound
            | IdentityError::MemberNotFound => ApiError::NotFound(err.to_string()),
            IdentityError::NotAuthorized => ApiError::Forbidden(err.to_string()),
            IdentityError::NotificationDispatch(e) => ApiError::BadGateway(e.to_string()),
            IdentityError::System(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();

        ApiError::ValidationError(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenancy_shared::auth::jwt::TokenRejection;
    use tenancy_shared::notify::NotifyError;

    fn status_of(err: IdentityError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::NotFound("User not found".to_string());
        assert_eq!(err.to_string(), "Not found: User not found");
    }

    #[test]
    fn test_identity_error_status_mapping() {
        assert_eq!(
            status_of(IdentityError::Validation("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_of(IdentityError::DuplicateEmail), StatusCode::CONFLICT);
        assert_eq!(
            status_of(IdentityError::AuthenticationFailure),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(IdentityError::InvalidToken(TokenRejection::Expired)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_of(IdentityError::MissingClaims), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(IdentityError::UserNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_of(IdentityError::RoleNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_of(IdentityError::MemberNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_of(IdentityError::NotAuthorized), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(IdentityError::NotificationDispatch(NotifyError::Transport(
                "down".into()
            ))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(IdentityError::System("db".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_authentication_failure_message_is_generic() {
        match ApiError::from(IdentityError::AuthenticationFailure) {
            ApiError::Unauthorized(msg) => assert_eq!(msg, "Invalid email or password!"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_token_rejections_share_one_message() {
        for rejection in [
            TokenRejection::Expired,
            TokenRejection::AudienceMismatch,
            TokenRejection::Malformed("InvalidSignature".to_string()),
        ] {
            match ApiError::from(IdentityError::InvalidToken(rejection)) {
                ApiError::Unauthorized(msg) => assert_eq!(msg, INVALID_TOKEN_MESSAGE),
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
