//! Consistent error responses: `{timestamp, status, error, message}`.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use serde_json::json;

use gatekeep_auth::AuthzError;
use gatekeep_core::DomainError;

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let status = match &err {
        DomainError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        DomainError::InvalidCredentials(_) | DomainError::UserDisabled => StatusCode::UNAUTHORIZED,
        DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::Conflict(_) | DomainError::DuplicateResource(_) => StatusCode::CONFLICT,
        DomainError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DomainError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(status, err.to_string())
}

pub fn authz_error_to_response(err: AuthzError) -> axum::response::Response {
    match err {
        AuthzError::Unauthenticated => json_error(StatusCode::UNAUTHORIZED, err.to_string()),
        AuthzError::Forbidden(_) => json_error(StatusCode::FORBIDDEN, err.to_string()),
    }
}

/// Malformed or missing JSON bodies are client errors.
pub fn rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, rejection.body_text())
}

pub fn path_rejection_to_response(rejection: PathRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, rejection.body_text())
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "timestamp": Utc::now().to_rfc3339(),
            "status": status.as_u16(),
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use gatekeep_core::EntityKind;

    use super::*;

    #[test]
    fn every_domain_error_maps_to_one_status() {
        let cases = [
            (DomainError::invalid_argument("x"), StatusCode::BAD_REQUEST),
            (DomainError::invalid_credentials("x"), StatusCode::UNAUTHORIZED),
            (DomainError::UserDisabled, StatusCode::UNAUTHORIZED),
            (DomainError::forbidden("x"), StatusCode::FORBIDDEN),
            (DomainError::not_found(EntityKind::Role, ["a"]), StatusCode::NOT_FOUND),
            (DomainError::conflict("x"), StatusCode::CONFLICT),
            (DomainError::duplicate("x"), StatusCode::CONFLICT),
            (DomainError::unavailable("x"), StatusCode::SERVICE_UNAVAILABLE),
            (DomainError::Internal, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }
}
