use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    response::IntoResponse,
};

use crate::app::dto;
use crate::app::services::{self, AppServices};

pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "store": services.backend(),
    }))
}

/// Server-sent change notices; `?entity=work_order` narrows the feed.
pub async fn events(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ChangeStreamQuery>,
) -> impl IntoResponse {
    services::change_stream(services, query.entity)
}
