//! Login, registration, and self-service account endpoints.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};

use crate::app::dto::{ChangeEmailRequest, ChangePasswordRequest, CredentialsRequest, PrincipalView, UserView};
use crate::app::routes::common::{body, respond};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::RequestPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/auth/me/password", put(change_password))
        .route("/api/auth/me/email", put(change_email))
}

/// POST /api/auth/register
pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Response {
    let req = match body(payload) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::CREATED,
        services.gateway.register(&req.email, &req.password).await,
    )
}

/// POST /api/auth/login
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Response {
    let req = match body(payload) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.gateway.login(&req.email, &req.password).await)
}

/// GET /api/auth/me
pub async fn me(Extension(ctx): Extension<RequestPrincipal>) -> Response {
    match authz::require_authenticated(&ctx) {
        Ok(principal) => (StatusCode::OK, Json(PrincipalView::from(principal))).into_response(),
        Err(resp) => resp,
    }
}

/// PUT /api/auth/me/password
pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Response {
    let principal = match authz::require_authenticated(&ctx) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let req = match body(payload) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let result = services
        .directory
        .change_password(principal, &req.current_password, &req.new_password)
        .await
        .map(UserView::from);
    respond(StatusCode::OK, result)
}

/// PUT /api/auth/me/email
pub async fn change_email(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestPrincipal>,
    payload: Result<Json<ChangeEmailRequest>, JsonRejection>,
) -> Response {
    let principal = match authz::require_authenticated(&ctx) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let req = match body(payload) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let result = services
        .directory
        .change_email(principal, &req.email)
        .await
        .map(UserView::from);
    respond(StatusCode::OK, result)
}
