//! Role CRUD plus the role-permission and group-role edge endpoints.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Extension, Path,
    },
    http::StatusCode,
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};

use gatekeep_core::{GroupId, PermissionId, RoleId};

use crate::app::dto::{
    AssignedResponse, CreateNamedRequest, DeletedResponse, GroupRolesEntry, RemovedResponse, RenameRequest,
    RolePermissionsEntry,
};
use crate::app::routes::common::{body, path, respond};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::RequestPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/api/roles", post(create_role).get(list_roles).delete(delete_roles))
        .route("/api/roles/:id", get(get_role).put(rename_role))
        .route("/api/roles/assign-permissions", post(assign_permissions))
        .route("/api/roles/deassign-permissions", delete(deassign_permissions))
        .route("/api/roles/groups/assign-roles", post(assign_group_roles))
        .route("/api/roles/groups/deassign-roles", delete(deassign_group_roles))
}

/// POST /api/roles
pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    payload: Result<Json<CreateNamedRequest>, JsonRejection>,
) -> Response {
    if let Err(resp) = authz::require_admin(&ctx) {
        return resp;
    }
    let req = match body(payload) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    respond(StatusCode::CREATED, services.directory.create_role(&req.name).await)
}

/// GET /api/roles
pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
) -> Response {
    if let Err(resp) = authz::require_authenticated(&ctx) {
        return resp;
    }
    respond(StatusCode::OK, services.directory.list_roles().await)
}

/// GET /api/roles/:id
pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    id: Result<Path<RoleId>, PathRejection>,
) -> Response {
    if let Err(resp) = authz::require_authenticated(&ctx) {
        return resp;
    }
    let role_id = match path(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.directory.get_role(role_id).await)
}

/// DELETE /api/roles (body: list of role IDs)
pub async fn delete_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    payload: Result<Json<Vec<RoleId>>, JsonRejection>,
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
        .delete_roles(&ids)
        .await
        .map(|report| DeletedResponse::new("roles", report));
    respond(StatusCode::OK, result)
}

/// PUT /api/roles/:id
pub async fn rename_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    id: Result<Path<RoleId>, PathRejection>,
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> Response {
    if let Err(resp) = authz::require_admin(&ctx) {
        return resp;
    }
    let role_id = match path(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let req = match body(payload) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let result = services
        .directory
        .rename_role(role_id, &req.name, req.version.into())
        .await;
    respond(StatusCode::OK, result)
}

/// POST /api/roles/assign-permissions (body: `[{roleId, permissionIds}]`)
pub async fn assign_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    payload: Result<Json<Vec<RolePermissionsEntry>>, JsonRejection>,
) -> Response {
    if let Err(resp) = authz::require_admin(&ctx) {
        return resp;
    }
    let entries = match body(payload) {
        Ok(entries) => grouped_permissions(entries),
        Err(resp) => return resp,
    };
    let result = services
        .role_permissions
        .assign_grouped(&entries)
        .await
        .map(|n| AssignedResponse::new("permission", n));
    respond(StatusCode::OK, result)
}

/// DELETE /api/roles/deassign-permissions
pub async fn deassign_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    payload: Result<Json<Vec<RolePermissionsEntry>>, JsonRejection>,
) -> Response {
    if let Err(resp) = authz::require_admin(&ctx) {
        return resp;
    }
    let entries = match body(payload) {
        Ok(entries) => grouped_permissions(entries),
        Err(resp) => return resp,
    };
    let result = services
        .role_permissions
        .deassign_grouped(&entries)
        .await
        .map(|n| RemovedResponse::new("permission", n));
    respond(StatusCode::OK, result)
}

/// POST /api/roles/groups/assign-roles (body: `[{groupId, roleIds}]`)
pub async fn assign_group_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    payload: Result<Json<Vec<GroupRolesEntry>>, JsonRejection>,
) -> Response {
    if let Err(resp) = authz::require_admin(&ctx) {
        return resp;
    }
    let entries = match body(payload) {
        Ok(entries) => grouped_roles(entries),
        Err(resp) => return resp,
    };
    let result = services
        .group_roles
        .assign_grouped(&entries)
        .await
        .map(|n| AssignedResponse::new("group role", n));
    respond(StatusCode::OK, result)
}

/// DELETE /api/roles/groups/deassign-roles
pub async fn deassign_group_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    payload: Result<Json<Vec<GroupRolesEntry>>, JsonRejection>,
) -> Response {
    if let Err(resp) = authz::require_admin(&ctx) {
        return resp;
    }
    let entries = match body(payload) {
        Ok(entries) => grouped_roles(entries),
        Err(resp) => return resp,
    };
    let result = services
        .group_roles
        .deassign_grouped(&entries)
        .await
        .map(|n| RemovedResponse::new("group role", n));
    respond(StatusCode::OK, result)
}

fn grouped_permissions(entries: Vec<RolePermissionsEntry>) -> Vec<(RoleId, Vec<PermissionId>)> {
    entries.into_iter().map(|e| (e.role_id, e.permission_ids)).collect()
}

fn grouped_roles(entries: Vec<GroupRolesEntry>) -> Vec<(GroupId, Vec<RoleId>)> {
    entries.into_iter().map(|e| (e.group_id, e.role_ids)).collect()
}
