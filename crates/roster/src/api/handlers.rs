//! API request handlers.

use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::query::QueryParams;
use crate::user::{RoleInfo, User, UserPayload};

use super::error::{ApiResult, ErrorResponse};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `?id=` selector used by the read endpoints.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IdQuery {
    pub id: Uuid,
}

/// `?userId=` selector used by the write endpoints.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AddRoleQuery {
    pub user_id: Uuid,
    #[serde(default)]
    pub role_name: String,
}

// ============================================================================
// User Handlers
// ============================================================================

/// List every user with its roles.
#[utoipa::path(
    get,
    path = "/api/user/GetAllUsers",
    tag = "Users",
    responses(
        (status = 200, description = "Every user with its roles", body = Vec<User>),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_all_users(State(state): State<AppState>) -> ApiResult<Json<Vec<User>>> {
    let users = state.users.list_all().await?;
    info!(count = users.len(), "Listed users");
    Ok(Json(users))
}

/// List one filtered, ordered page of users.
#[utoipa::path(
    get,
    path = "/api/user/GetSpecificUsers",
    tag = "Users",
    params(QueryParams),
    responses(
        (status = 200, description = "One page of matching users", body = Vec<User>),
        (status = 400, description = "Unknown sort field or direction, or bad paging", body = ErrorResponse),
        (status = 425, description = "Page lies past the last page", body = ErrorResponse)
    )
)]
#[instrument(skip(state, query))]
pub async fn get_specific_users(
    State(state): State<AppState>,
    query: Result<Query<QueryParams>, QueryRejection>,
) -> ApiResult<Json<Vec<User>>> {
    let Query(params) = query?;
    let users = state.users.list_page(&params).await?;
    info!(count = users.len(), page = params.page, "Listed user page");
    Ok(Json(users))
}

#[utoipa::path(
    get,
    path = "/api/user/GetUserById",
    tag = "Users",
    params(IdQuery),
    responses(
        (status = 200, description = "The user with its roles", body = User),
        (status = 400, description = "Missing or malformed id", body = ErrorResponse),
        (status = 404, description = "No such user", body = ErrorResponse)
    )
)]
#[instrument(skip(state, query))]
pub async fn get_user_by_id(
    State(state): State<AppState>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Json<User>> {
    let Query(IdQuery { id }) = query?;
    Ok(Json(state.users.get(id).await?))
}

#[utoipa::path(
    get,
    path = "/api/user/GetUserRolesById",
    tag = "Users",
    params(IdQuery),
    responses(
        (status = 200, description = "Names of the user's roles", body = Vec<RoleInfo>),
        (status = 400, description = "Missing or malformed id", body = ErrorResponse),
        (status = 404, description = "No such user", body = ErrorResponse)
    )
)]
#[instrument(skip(state, query))]
pub async fn get_user_roles_by_id(
    State(state): State<AppState>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<RoleInfo>>> {
    let Query(IdQuery { id }) = query?;
    Ok(Json(state.users.roles(id).await?))
}

/// Create a user. A JSON `null` body is reported as a missing payload.
#[utoipa::path(
    post,
    path = "/api/user/CreateUser",
    tag = "Users",
    request_body = UserPayload,
    responses(
        (status = 204, description = "User created"),
        (status = 400, description = "Missing or malformed body", body = ErrorResponse),
        (status = 422, description = "Email already in use", body = ErrorResponse),
        (status = 424, description = "A field rule failed", body = ErrorResponse)
    )
)]
#[instrument(skip(state, body))]
pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<Option<UserPayload>>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(payload) = body?;
    state.users.create(payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/user/UpdateUser",
    tag = "Users",
    params(UserIdQuery),
    request_body = UserPayload,
    responses(
        (status = 204, description = "User updated"),
        (status = 400, description = "Invalid id or body", body = ErrorResponse),
        (status = 404, description = "No such user", body = ErrorResponse),
        (status = 422, description = "Email held by another user", body = ErrorResponse)
    )
)]
#[instrument(skip(state, query, body))]
pub async fn update_user(
    State(state): State<AppState>,
    query: Result<Query<UserIdQuery>, QueryRejection>,
    body: Result<Json<Option<UserPayload>>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Query(UserIdQuery { user_id }) = query?;
    let Json(payload) = body?;
    state.users.update(user_id, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/user/AddRoleToUser",
    tag = "Users",
    params(AddRoleQuery),
    responses(
        (status = 204, description = "Role assigned"),
        (status = 400, description = "Invalid id or blank role name", body = ErrorResponse),
        (status = 404, description = "No such user or role", body = ErrorResponse),
        (status = 423, description = "User already holds the role", body = ErrorResponse)
    )
)]
#[instrument(skip(state, query))]
pub async fn add_role_to_user(
    State(state): State<AppState>,
    query: Result<Query<AddRoleQuery>, QueryRejection>,
) -> ApiResult<StatusCode> {
    let Query(AddRoleQuery { user_id, role_name }) = query?;
    state.users.assign_role(user_id, &role_name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/user/DeleteUser",
    tag = "Users",
    params(UserIdQuery),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Missing or malformed id", body = ErrorResponse),
        (status = 404, description = "No such user", body = ErrorResponse)
    )
)]
#[instrument(skip(state, query))]
pub async fn delete_user(
    State(state): State<AppState>,
    query: Result<Query<UserIdQuery>, QueryRejection>,
) -> ApiResult<StatusCode> {
    let Query(UserIdQuery { user_id }) = query?;
    state.users.delete(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
