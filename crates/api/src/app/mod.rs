//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and the access-control services
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router over already wired services.
pub fn build_app(services: Arc<AppServices>) -> Router {
    let api = routes::router().layer(
        ServiceBuilder::new()
            .layer(Extension(services.clone()))
            .layer(axum::middleware::from_fn_with_state(services, middleware::auth_middleware)),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(api)
}
