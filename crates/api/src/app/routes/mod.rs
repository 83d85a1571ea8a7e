use axum::{Router, routing::get};

pub mod bom;
pub mod inventory;
pub mod serials;
pub mod system;
pub mod work_orders;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/events", get(system::events))
        .merge(work_orders::router())
        .merge(serials::router())
        .merge(inventory::router())
        .merge(bom::router())
}
