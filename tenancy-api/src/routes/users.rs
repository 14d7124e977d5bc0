/// User endpoints
///
/// - `POST /v1/users/signup`: register and email an organisation invitation
/// - `POST /v1/users/signin`: exchange credentials for `login` tokens
/// - `POST /v1/users/refresh`: exchange a refresh token for an access token
/// - `POST /v1/users/forgot-password`: email a password reset link
/// - `POST /v1/users/reset-password/:token`: set a new password

use crate::{
    app::AppState,
    error::ApiResult,
    routes::{validated, ApiResponse},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tenancy_shared::identity::{Registration, ResetToken, SessionTokens};
use validator::Validate;

fn default_role() -> String {
    "owner".to_string()
}

/// Signup request
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    /// Organisation to join, created if it does not exist
    #[validate(length(min = 1, max = 255, message = "Organisation name is required"))]
    pub org_name: String,

    /// Role within the organisation
    #[serde(default = "default_role")]
    #[validate(length(min = 1, max = 255, message = "Role is required"))]
    pub role: String,

    pub description: Option<String>,
}

/// Signin request
#[derive(Debug, Deserialize, Validate)]
pub struct SigninRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

/// Refresh request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Refresh response
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

/// Forgot-password request
#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Reset-password request
#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,

    #[validate(must_match(other = "new_password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

/// Registers a user
///
/// Responds `201` with the user, organisation and role. The invitation
/// token is only delivered by email.
///
/// # Errors
///
/// - `409 Conflict`: email already registered
/// - `422 Unprocessable Entity`: validation failed
/// - `502 Bad Gateway`: invitation email could not be sent (nothing is saved)
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Registration>>)> {
    let req = validated(req)?;

    let registration = state
        .identity
        .register(
            &req.email,
            &req.password,
            &req.org_name,
            &req.role,
            req.description.as_deref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_data(
            "User registered and member invitation sent to registered email",
            registration,
        ),
    ))
}

/// Authenticates a user
///
/// # Errors
///
/// - `401 Unauthorized`: unknown email or wrong password, indistinguishably
pub async fn signin(
    State(state): State<AppState>,
    Json(req): Json<SigninRequest>,
) -> ApiResult<Json<ApiResponse<SessionTokens>>> {
    let req = validated(req)?;

    let tokens = state.identity.login(&req.email, &req.password).await?;

    Ok(ApiResponse::with_data("Login successful", tokens))
}

/// Issues a new access token from a refresh token
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<ApiResponse<RefreshResponse>>> {
    let access_token = state.identity.refresh(&req.refresh_token).await?;

    Ok(ApiResponse::with_data(
        "Token refreshed",
        RefreshResponse { access_token },
    ))
}

/// Emails a reset link to a registered address
///
/// # Errors
///
/// - `404 Not Found`: no user with this email
/// - `502 Bad Gateway`: email could not be sent
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<ApiResponse<ResetToken>>> {
    let req = validated(req)?;

    let reset = state.identity.forgot_password(&req.email).await?;

    Ok(ApiResponse::with_data(
        "Reset link sent to registered email",
        reset,
    ))
}

/// Sets a new password using a reset token
///
/// # Errors
///
/// - `401 Unauthorized`: token invalid, expired or for another purpose
/// - `404 Not Found`: the user no longer exists
/// - `422 Unprocessable Entity`: passwords missing or not matching
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let req = validated(req)?;

    state
        .identity
        .reset_password(&token, &req.new_password)
        .await?;

    Ok(ApiResponse::message("Password reset successful"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_role_defaults_to_owner() {
        let req: SignupRequest = serde_json::from_value(serde_json::json!({
            "email": "a@x.com",
            "password": "pw1",
            "org_name": "Acme"
        }))
        .unwrap();

        assert_eq!(req.role, "owner");
        assert!(req.description.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_signup_rejects_bad_email() {
        let req = SignupRequest {
            email: "not-an-email".to_string(),
            password: "pw1".to_string(),
            org_name: "Acme".to_string(),
            role: "owner".to_string(),
            description: None,
        };
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
    }

    #[test]
    fn test_reset_password_confirmation_must_match() {
        let req = ResetPasswordRequest {
            new_password: "pw2".to_string(),
            confirm_password: "pw3".to_string(),
        };
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("confirm_password"));

        let req = ResetPasswordRequest {
            new_password: "pw2".to_string(),
            confirm_password: "pw2".to_string(),
        };
        assert!(req.validate().is_ok());
    }
}
