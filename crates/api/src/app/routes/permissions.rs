//! Permission catalogue endpoints.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::Response,
    routing::post,
    Json, Router,
};

use gatekeep_core::PermissionId;

use crate::app::dto::{CreateNamedRequest, DeletedResponse};
use crate::app::routes::common::{body, respond};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::RequestPrincipal;

pub fn router() -> Router {
    Router::new().route(
        "/api/permissions",
        post(create_permission).get(list_permissions).delete(delete_permissions),
    )
}

/// POST /api/permissions
pub async fn create_permission(
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
    respond(StatusCode::CREATED, services.directory.create_permission(&req.name).await)
}

/// GET /api/permissions
pub async fn list_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
) -> Response {
    if let Err(resp) = authz::require_authenticated(&ctx) {
        return resp;
    }
    respond(StatusCode::OK, services.directory.list_permissions().await)
}

/// DELETE /api/permissions (body: list of permission IDs)
pub async fn delete_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    payload: Result<Json<Vec<PermissionId>>, JsonRejection>,
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
        .delete_permissions(&ids)
        .await
        .map(|report| DeletedResponse::new("permissions", report));
    respond(StatusCode::OK, result)
}
