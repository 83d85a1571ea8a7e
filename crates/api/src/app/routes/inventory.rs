use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};

use forgemrp_inventory::{StockMovement, TransactionKind};

use crate::app::dto;
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/inventory/:part", get(get_stock))
        .route(
            "/inventory/:part/transactions",
            get(list_transactions).post(record_movement),
        )
        .route("/inventory/:part/reorder", put(set_reorder))
}

/// Unknown parts read as an all-zero row.
pub async fn get_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(part): Path<String>,
) -> axum::response::Response {
    let part = match dto::parse_part(&part) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.fulfillment().stock(&part).await {
        Ok(item) => Json(dto::StockResponse::from(&item)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Path(part): Path<String>,
    Json(body): Json<dto::StockMovementRequest>,
) -> axum::response::Response {
    let part = match dto::parse_part(&part) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let kind = match body.kind.parse::<TransactionKind>() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let movement = match StockMovement::new(kind, body.quantity) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services
        .fulfillment()
        .record_movement(&part, movement, body.reference.unwrap_or_default())
        .await
    {
        Ok(item) => (StatusCode::CREATED, Json(dto::StockResponse::from(&item))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Path(part): Path<String>,
) -> axum::response::Response {
    let part = match dto::parse_part(&part) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.fulfillment().transactions(&part).await {
        Ok(rows) => Json(
            rows.iter()
                .map(dto::TransactionResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn set_reorder(
    Extension(services): Extension<Arc<AppServices>>,
    Path(part): Path<String>,
    Json(body): Json<dto::ReorderRequest>,
) -> axum::response::Response {
    let part = match dto::parse_part(&part) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let point = match dto::opt_quantity(body.reorder_point, "reorder_point") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let qty = match dto::opt_quantity(body.reorder_qty, "reorder_qty") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.fulfillment().set_reorder(&part, point, qty).await {
        Ok(item) => Json(dto::StockResponse::from(&item)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
