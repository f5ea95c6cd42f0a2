use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, middleware::Next, response::Response};

use crate::app::services::AppServices;
use crate::context::RequestPrincipal;

/// Resolve the bearer token (if any) into a [`RequestPrincipal`].
///
/// Invalid, expired or missing tokens never fail the request here: they yield
/// an anonymous principal and the handler's guard decides.
pub async fn auth_middleware(
    State(services): State<Arc<AppServices>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = extract_bearer(req.headers()).map(str::to_owned);

    let principal = match token {
        Some(token) => services.gateway.authenticate_from_token(&token).await,
        None => None,
    };

    req.extensions_mut().insert(RequestPrincipal::new(principal));
    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
