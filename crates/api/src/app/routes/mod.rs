use axum::Router;

pub mod auth;
pub mod common;
pub mod groups;
pub mod permissions;
pub mod roles;
pub mod system;
pub mod users;

/// Router for every `/api` endpoint. Each handler applies its own guard;
/// the auth layer only resolves the principal.
pub fn router() -> Router {
    Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(roles::router())
        .merge(groups::router())
        .merge(permissions::router())
}
