//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and service construction
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the black-box tests).
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    Router::new().nest("/api", routes::router()).layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn(middleware::request_log))
            .layer(Extension(services)),
    )
}
