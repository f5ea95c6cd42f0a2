//! Group CRUD with cascade delete.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::Response,
    routing::post,
    Json, Router,
};

use gatekeep_core::GroupId;

use crate::app::dto::{CreateNamedRequest, DeletedResponse};
use crate::app::routes::common::{body, respond};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::RequestPrincipal;

pub fn router() -> Router {
    Router::new().route(
        "/api/groups",
        post(create_group).get(list_groups).delete(delete_groups),
    )
}

/// POST /api/groups
pub async fn create_group(
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
    respond(StatusCode::CREATED, services.directory.create_group(&req.name).await)
}

/// GET /api/groups
pub async fn list_groups(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
) -> Response {
    if let Err(resp) = authz::require_authenticated(&ctx) {
        return resp;
    }
    respond(StatusCode::OK, services.directory.list_groups().await)
}

/// DELETE /api/groups (body: list of group IDs)
pub async fn delete_groups(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    payload: Result<Json<Vec<GroupId>>, JsonRejection>,
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
        .delete_groups(&ids)
        .await
        .map(|report| DeletedResponse::new("groups", report));
    respond(StatusCode::OK, result)
}
