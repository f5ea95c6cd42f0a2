//! User administration: listing, enablement, edge assignment, cascade delete.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Extension, Path,
    },
    http::StatusCode,
    response::Response,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;

use gatekeep_core::UserId;

use crate::app::dto::{
    AssignedResponse, DeletedResponse, RemovedResponse, SetEnabledRequest, UserGroupsRequest, UserRolesRequest,
    UserView,
};
use crate::app::routes::common::{body, path, respond};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::RequestPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/api/users", get(list_users).delete(delete_users))
        .route("/api/users/roles/assign", post(assign_roles))
        .route("/api/users/roles/deassign", delete(deassign_roles))
        .route("/api/users/groups/assign", post(assign_groups))
        .route("/api/users/groups/deassign", delete(deassign_groups))
        .route("/api/users/:id", get(get_user))
        .route("/api/users/:id/permissions", get(user_permissions))
        .route("/api/users/:id/enabled", put(set_enabled))
}

/// GET /api/users
pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
) -> Response {
    if let Err(resp) = authz::require_admin(&ctx) {
        return resp;
    }
    let result = services
        .directory
        .list_users()
        .await
        .map(|users| users.into_iter().map(UserView::from).collect::<Vec<_>>());
    respond(StatusCode::OK, result)
}

/// GET /api/users/:id
pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    id: Result<Path<UserId>, PathRejection>,
) -> Response {
    if let Err(resp) = authz::require_admin(&ctx) {
        return resp;
    }
    let user_id = match path(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.directory.get_user(user_id).await.map(UserView::from))
}

/// DELETE /api/users (body: list of user IDs)
pub async fn delete_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    payload: Result<Json<Vec<UserId>>, JsonRejection>,
) -> Response {
    if let Err(resp) = authz::require_admin(&ctx) {
        return resp;
    }
    let ids = match body(payload) {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };
    let result = services
        .cascade
        .delete_users(&ids)
        .await
        .map(|report| DeletedResponse::new("users", report));
    respond(StatusCode::OK, result)
}

/// POST /api/users/roles/assign
pub async fn assign_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    payload: Result<Json<UserRolesRequest>, JsonRejection>,
) -> Response {
    if let Err(resp) = authz::require_admin(&ctx) {
        return resp;
    }
    let req = match body(payload) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let result = services
        .user_roles
        .assign(&req.user_ids, &req.role_ids)
        .await
        .map(|n| AssignedResponse::new("role", n));
    respond(StatusCode::OK, result)
}

/// DELETE /api/users/roles/deassign
pub async fn deassign_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    payload: Result<Json<UserRolesRequest>, JsonRejection>,
) -> Response {
    if let Err(resp) = authz::require_admin(&ctx) {
        return resp;
    }
    let req = match body(payload) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let result = services
        .user_roles
        .deassign(&req.user_ids, &req.role_ids)
        .await
        .map(|n| RemovedResponse::new("role", n));
    respond(StatusCode::OK, result)
}

/// POST /api/users/groups/assign
pub async fn assign_groups(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    payload: Result<Json<UserGroupsRequest>, JsonRejection>,
) -> Response {
    if let Err(resp) = authz::require_admin(&ctx) {
        return resp;
    }
    let req = match body(payload) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let result = services
        .user_groups
        .assign(&req.user_ids, &req.group_ids)
        .await
        .map(|n| AssignedResponse::new("group", n));
    respond(StatusCode::OK, result)
}

/// DELETE /api/users/groups/deassign
pub async fn deassign_groups(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    payload: Result<Json<UserGroupsRequest>, JsonRejection>,
) -> Response {
    if let Err(resp) = authz::require_admin(&ctx) {
        return resp;
    }
    let req = match body(payload) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let result = services
        .user_groups
        .deassign(&req.user_ids, &req.group_ids)
        .await
        .map(|n| RemovedResponse::new("group", n));
    respond(StatusCode::OK, result)
}

/// GET /api/users/:id/permissions - effective permissions of one user
pub async fn user_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    id: Result<Path<UserId>, PathRejection>,
) -> Response {
    if let Err(resp) = authz::require_admin(&ctx) {
        return resp;
    }
    let user_id = match path(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result = services
        .resolver
        .resolve_permissions(user_id)
        .await
        .map(|permissions| json!({ "userId": user_id, "permissions": permissions }));
    respond(StatusCode::OK, result)
}

/// PUT /api/users/:id/enabled
pub async fn set_enabled(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    id: Result<Path<UserId>, PathRejection>,
    payload: Result<Json<SetEnabledRequest>, JsonRejection>,
) -> Response {
    let admin = match authz::require_admin(&ctx) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let user_id = match path(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let req = match body(payload) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let result = services
        .directory
        .set_user_enabled(admin, user_id, req.enabled, req.version.into())
        .await
        .map(UserView::from);
    respond(StatusCode::OK, result)
}
