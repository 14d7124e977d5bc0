/// Member endpoints
///
/// - `POST /v1/members/invite/:token`: accept an emailed invitation
/// - `DELETE /v1/members/:id`: remove one of the caller's own memberships (bearer)
/// - `POST /v1/members/role`: move a member to another role (bearer)

use crate::{
    app::{AppState, AuthContext},
    error::ApiResult,
    routes::ApiResponse,
};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use tenancy_shared::models::Member;
use uuid::Uuid;

/// Role change request
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
}

/// Creates the membership described by an invitation token
///
/// Accepting the same invitation twice returns the existing membership.
///
/// # Errors
///
/// - `401 Unauthorized`: token invalid, expired or not an invitation
/// - `400 Bad Request`: token lacks user, organisation or role
pub async fn accept_invite(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<ApiResponse<Member>>> {
    let member = state.identity.accept_invite(&token).await?;

    Ok(ApiResponse::with_data("Invitation accepted", member))
}

/// Removes a membership owned by the caller
///
/// # Errors
///
/// - `404 Not Found`: no such member
/// - `403 Forbidden`: the member belongs to another user
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(member_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    state
        .identity
        .remove_member(auth.user_id, member_id)
        .await?;

    Ok(ApiResponse::message("Member removed"))
}

/// Changes a member's role
///
/// # Errors
///
/// - `404 Not Found`: role not in that organisation, or no such member
pub async fn update_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdateRoleRequest>,
) -> ApiResult<Json<ApiResponse<Member>>> {
    tracing::debug!(caller = %auth.user_id, member_user = %req.user_id, "Role update requested");

    let member = state
        .identity
        .update_member_role(req.org_id, req.user_id, req.role_id)
        .await?;

    Ok(ApiResponse::with_data("Member role updated", member))
}
