/// Statistics endpoints
///
/// - `GET /v1/stats/roles/users/count`
/// - `GET /v1/stats/org/member/count?from=..&to=..`
/// - `GET /v1/stats/org/roles/users/count?from=..&to=..`
///
/// `from` and `to` are RFC 3339 timestamps. The window applies only when
/// both are given.

use crate::{app::AppState, error::ApiResult, routes::ApiResponse};
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tenancy_shared::reporting::{
    OrganisationCounts, OrganisationRoleCounts, RoleCounts, TimeRange,
};

/// Optional creation-time window
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl RangeQuery {
    fn range(&self) -> Option<TimeRange> {
        TimeRange::from_bounds(self.from, self.to)
    }
}

const FETCHED: &str = "Data fetched successfully";

/// Users per role name
pub async fn users_per_role(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<RoleCounts>>> {
    let counts = state.reporting.users_per_role().await?;
    Ok(ApiResponse::with_data(FETCHED, counts))
}

/// Members per organisation, windowed on member creation
pub async fn members_per_organisation(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<ApiResponse<OrganisationCounts>>> {
    let counts = state
        .reporting
        .members_per_organisation(query.range())
        .await?;
    Ok(ApiResponse::with_data(FETCHED, counts))
}

/// Users per role per organisation, windowed on user creation
pub async fn users_per_organisation_role(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<ApiResponse<OrganisationRoleCounts>>> {
    let counts = state
        .reporting
        .users_per_organisation_role(query.range())
        .await?;
    Ok(ApiResponse::with_data(FETCHED, counts))
}
