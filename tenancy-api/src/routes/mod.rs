/// API route handlers
///
/// - `health`: liveness and store connectivity
/// - `users`: signup, signin, refresh, password reset
/// - `members`: invitation acceptance, member removal, role changes
/// - `stats`: membership statistics
///
/// Successful responses share one envelope:
///
/// ```json
/// { "message": "Login successful", "status": "success", "data": { ... } }
/// ```

pub mod health;
pub mod members;
pub mod stats;
pub mod users;

use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ApiResult;

/// Success envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub message: String,

    /// Always `"success"`
    pub status: String,

    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            message: message.into(),
            status: "success".to_string(),
            data: Some(data),
        })
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
            status: "success".to_string(),
            data: None,
        })
    }
}

/// Runs `validator` rules on a request body
pub(crate) fn validated<T: Validate>(req: T) -> ApiResult<T> {
    req.validate()?;
    Ok(req)
}
