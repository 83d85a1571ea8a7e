use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
};

use forgemrp_production::SerialStatus;

use crate::app::dto;
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/serials/:serial", get(trace_serial).put(update_serial_status))
}

/// Reverse trace: the unit, its work order and the assembly it belongs to.
pub async fn trace_serial(
    Extension(services): Extension<Arc<AppServices>>,
    Path(serial): Path<String>,
) -> axum::response::Response {
    let serial = match dto::parse_serial(&serial) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.fulfillment().trace_serial(&serial).await {
        Ok(trace) => Json(dto::TraceResponse::from(&trace)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn update_serial_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(serial): Path<String>,
    Json(body): Json<dto::SerialStatusRequest>,
) -> axum::response::Response {
    let serial = match dto::parse_serial(&serial) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let to = match body.status.parse::<SerialStatus>() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services
        .fulfillment()
        .transition_serial(&serial, to, body.notes)
        .await
    {
        Ok(unit) => Json(dto::SerialResponse::from(&unit)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
