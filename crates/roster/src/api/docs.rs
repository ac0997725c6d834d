//! OpenAPI description of the REST API.

use axum::Json;
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::handlers::{self, HealthResponse};
use crate::user::{Role, RoleInfo, User, UserPayload};

#[derive(OpenApi)]
#[openapi(
    info(title = "Roster", description = "User and role management API"),
    paths(
        handlers::health,
        handlers::get_all_users,
        handlers::get_specific_users,
        handlers::get_user_by_id,
        handlers::get_user_roles_by_id,
        handlers::create_user,
        handlers::update_user,
        handlers::add_role_to_user,
        handlers::delete_user,
    ),
    components(schemas(User, Role, RoleInfo, UserPayload, ErrorResponse, HealthResponse)),
    tags(
        (name = "Users", description = "User and role management"),
        (name = "Health", description = "Liveness")
    )
)]
pub struct ApiDoc;

/// Serve the OpenAPI document as JSON.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
