use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::{get, put},
};
use rust_decimal::Decimal;

use forgemrp_production::BomLine;

use crate::app::dto;
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/bom/:parent", get(list_lines))
        .route("/bom/:parent/explode", get(explode))
        .route("/bom/:parent/:child", put(upsert_line))
}

pub async fn upsert_line(
    Extension(services): Extension<Arc<AppServices>>,
    Path((parent, child)): Path<(String, String)>,
    Json(body): Json<dto::BomLineRequest>,
) -> axum::response::Response {
    let parent = match dto::parse_part(&parent) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let child = match dto::parse_part(&child) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let qty_per = match dto::positive_quantity(body.qty_per, "qty_per") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let line = match BomLine::new(parent, child, qty_per) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.fulfillment().upsert_bom_line(line).await {
        Ok(line) => Json(dto::BomLineResponse::from(&line)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_lines(
    Extension(services): Extension<Arc<AppServices>>,
    Path(parent): Path<String>,
) -> axum::response::Response {
    let parent = match dto::parse_part(&parent) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.fulfillment().bom_lines(&parent).await {
        Ok(lines) => Json(
            lines
                .iter()
                .map(dto::BomLineResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Multi-level requirements down to leaf components; `qty` defaults to 1.
pub async fn explode(
    Extension(services): Extension<Arc<AppServices>>,
    Path(parent): Path<String>,
    Query(query): Query<dto::ExplodeQuery>,
) -> axum::response::Response {
    let parent = match dto::parse_part(&parent) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let qty = match dto::positive_quantity(query.qty.unwrap_or(Decimal::ONE), "qty") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.fulfillment().explode_bom(&parent, qty).await {
        Ok(requirements) => Json(requirements).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
