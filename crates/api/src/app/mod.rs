//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection, the fulfillment service and change fan-out
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::config::AppConfig;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router for a configuration (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let services = services::build_services(&config.store).await?;
    Ok(router(Arc::new(services)))
}

/// Router over already-built services (tests inject their own).
pub fn router(services: Arc<services::AppServices>) -> Router {
    routes::router()
        .layer(Extension(services))
        .layer(ServiceBuilder::new())
}
