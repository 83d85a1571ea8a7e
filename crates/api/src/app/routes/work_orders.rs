use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use forgemrp_infra::SerialRequest;
use forgemrp_production::{NewWorkOrder, Priority, WorkOrderPatch};

use crate::app::dto::{self, WorkOrderResponse};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/workorders", post(create_work_order))
        .route(
            "/workorders/:id",
            get(get_work_order)
                .put(update_work_order)
                .delete(delete_work_order),
        )
        .route("/workorders/:id/kit", post(kit_work_order))
        .route("/workorders/:id/reservations", get(list_reservations))
        .route("/workorders/:id/serials", post(assign_serial).get(list_serials))
}

pub async fn create_work_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateWorkOrderRequest>,
) -> axum::response::Response {
    let assembly = match dto::parse_part(&body.assembly) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let quantity = match dto::positive_quantity(body.quantity, "quantity") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let priority = match dto::parse_opt::<Priority>(body.priority.as_deref()) {
        Ok(v) => v.unwrap_or_default(),
        Err(resp) => return resp,
    };
    let status = match dto::parse_opt(body.status.as_deref()) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let new = NewWorkOrder {
        assembly,
        quantity,
        priority,
        due_date: body.due_date,
        notes: body.notes,
        status,
    };

    match services.fulfillment().create_work_order(new).await {
        Ok(wo) => (StatusCode::CREATED, Json(WorkOrderResponse::from(&wo))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_work_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_work_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.fulfillment().work_order(id).await {
        Ok(wo) => Json(WorkOrderResponse::from(&wo)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn update_work_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateWorkOrderRequest>,
) -> axum::response::Response {
    let id = match dto::parse_work_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let patch = match build_patch(body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match services.fulfillment().update_work_order(id, patch).await {
        Ok(updated) => {
            let mut resp = WorkOrderResponse::from(&updated.order);
            resp.settlement = updated.outcome.settlement;
            Json(resp).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

fn build_patch(body: dto::UpdateWorkOrderRequest) -> Result<WorkOrderPatch, axum::response::Response> {
    Ok(WorkOrderPatch {
        status: dto::parse_opt(body.status.as_deref())?,
        qty_good: dto::opt_quantity(body.qty_good, "qty_good")?,
        qty_scrap: dto::opt_quantity(body.qty_scrap, "qty_scrap")?,
        priority: dto::parse_opt(body.priority.as_deref())?,
        due_date: body.due_date,
        notes: body.notes,
    })
}

pub async fn delete_work_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_work_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.fulfillment().delete_work_order(id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn kit_work_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_work_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // Shortage is reported in the body, not as an error status.
    match services.fulfillment().kit_work_order(id).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_reservations(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_work_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.fulfillment().reservations(id).await {
        Ok(rows) => Json(
            rows.iter()
                .map(dto::ReservationResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn assign_serial(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Bytes,
) -> axum::response::Response {
    let id = match dto::parse_work_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    // The body is optional; an empty one asks for a generated serial.
    let body: dto::AssignSerialRequest = if body.iter().all(u8::is_ascii_whitespace) {
        dto::AssignSerialRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(b) => b,
            Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", e.to_string()),
        }
    };

    let serial = match body.serial_number.as_deref().map(dto::parse_serial).transpose() {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let status = match dto::parse_opt(body.status.as_deref()) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let request = SerialRequest {
        serial,
        status,
        notes: body.notes,
    };

    match services.fulfillment().assign_serial(id, request).await {
        Ok(unit) => (StatusCode::CREATED, Json(dto::SerialResponse::from(&unit))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_serials(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_work_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.fulfillment().serials(id).await {
        Ok(units) => Json(
            units
                .iter()
                .map(dto::SerialResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
