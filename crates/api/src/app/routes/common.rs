//! Shared handler plumbing: body extraction and result-to-response mapping.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use gatekeep_core::DomainResult;

use crate::app::errors;

/// Unwrap a JSON body, turning extractor rejections into a 400.
pub fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload.map(|Json(inner)| inner).map_err(errors::rejection_to_response)
}

pub fn path<T>(param: Result<Path<T>, PathRejection>) -> Result<T, Response> {
    param.map(|Path(inner)| inner).map_err(errors::path_rejection_to_response)
}

pub fn respond<T: Serialize>(status: StatusCode, result: DomainResult<T>) -> Response {
    match result {
        Ok(value) => (status, Json(value)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
