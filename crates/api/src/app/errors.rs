use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use forgemrp_core::DomainError;
use forgemrp_infra::StoreError;

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Domain(e) => domain_error_to_response(e),
        StoreError::Backend(msg) => {
            tracing::error!(error = %msg, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
